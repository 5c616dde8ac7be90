use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use devprofile_core::AppConfig;
use devprofile_sources::{
    collect_profiles, http_client_from_config, BitbucketClient, GithubClient, ProfileQuery,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "devprofile-cli")]
#[command(about = "Look up developer profiles on GitHub and Bitbucket")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch a profile from both providers and print it as JSON
    Profile {
        /// Account name used for every provider without an override
        username: String,
        #[arg(long)]
        github_username: Option<String>,
        #[arg(long)]
        bitbucket_username: Option<String>,
        /// Look the Bitbucket name up as an individual user, not a team
        #[arg(long)]
        individual: bool,
        /// Print one combined record instead of both provider profiles
        #[arg(long)]
        merged: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = devprofile_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Profile {
            username,
            github_username,
            bitbucket_username,
            individual,
            merged,
        }) => {
            let query = profile_query(username, github_username, bitbucket_username, individual);
            println!("{}", render_profile(&config, &query, merged).await?);
        }
        None => Cli::command().print_help()?,
    }

    Ok(())
}

/// Builds the lookup from command arguments. Empty overrides fall back to
/// `username`.
fn profile_query(
    username: String,
    github_username: Option<String>,
    bitbucket_username: Option<String>,
    individual: bool,
) -> ProfileQuery {
    ProfileQuery {
        username,
        github_username: github_username.filter(|s| !s.is_empty()),
        bitbucket_username: bitbucket_username.filter(|s| !s.is_empty()),
        bitbucket_team: !individual,
    }
}

/// Collects the profiles for `query` and renders them as pretty JSON.
async fn render_profile(
    config: &AppConfig,
    query: &ProfileQuery,
    merged: bool,
) -> anyhow::Result<String> {
    let http = http_client_from_config(config)?;
    let github = GithubClient::from_config(http.clone(), config)?;
    let bitbucket = BitbucketClient::from_config(http, config)?;

    let profiles = collect_profiles(&github, &bitbucket, query)
        .await
        .with_context(|| format!("failed to collect profiles for {}", query.username))?;

    if profiles.github.is_none() {
        tracing::warn!(name = query.github_name(), "no GitHub account found");
    }
    if profiles.bitbucket.is_none() {
        tracing::warn!(name = query.bitbucket_name(), "no BitBucket account found");
    }
    tracing::info!(
        username = %query.username,
        github = profiles.github.is_some(),
        bitbucket = profiles.bitbucket.is_some(),
        merged,
        "profiles collected"
    );

    let rendered = if merged {
        serde_json::to_string_pretty(&profiles.merged())?
    } else {
        serde_json::to_string_pretty(&profiles)?
    };
    Ok(rendered)
}
