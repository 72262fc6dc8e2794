use clap::{Parser, Subcommand};
use std::io;

#[derive(Subcommand)]
enum CommandLineCommand {
  /// Creates a campaign that the runner will pick up on its next cycle.
  AddCampaign {
    /// The page under test.
    #[clap(short, long)]
    url: String,

    /// Browser engines to fan out over. Repeatable.
    #[clap(short, long)]
    engine: Vec<String>,

    /// User agent strings to fan out over. Repeatable.
    #[clap(short = 'a', long)]
    user_agent: Vec<String>,

    /// Use the mobile screen preset instead of desktop.
    #[clap(short, long)]
    mobile: bool,

    /// Analyzer names to run when comparing runs. Repeatable.
    #[clap(short = 't', long)]
    auto_test: Vec<String>,
  },

  /// Prints recent campaigns.
  ListCampaigns,

  /// Queues a single one-off job for the conductor.
  AddJob {
    /// The page under test.
    #[clap(short, long)]
    url: String,

    /// Browser engine to lease.
    #[clap(short, long)]
    engine: String,

    /// User agent string applied to the tab.
    #[clap(short = 'a', long)]
    user_agent: String,

    /// Use the mobile screen preset instead of desktop.
    #[clap(short, long)]
    mobile: bool,
  },
}

#[derive(Parser)]
#[command(author, version = option_env!("COMPAT_VERSION").unwrap_or_else(|| "dev"), about, long_about = None)]
struct CommandLineArguments {
  #[clap(short, long)]
  config: String,

  #[clap(subcommand)]
  command: CommandLineCommand,
}

fn parsed_url(value: &str) -> io::Result<String> {
  let parsed = url::Url::parse(value).map_err(|error| {
    log::warn!("invalid url '{value}' - {error}");
    io::Error::new(io::ErrorKind::Other, format!("invalid url - {error}"))
  })?;

  Ok(parsed.to_string())
}

fn kind_for(mobile: bool) -> compat::types::CampaignKind {
  if mobile {
    compat::types::CampaignKind::Mobile
  } else {
    compat::types::CampaignKind::Desktop
  }
}

async fn run(args: CommandLineArguments) -> io::Result<()> {
  let contents = async_std::fs::read_to_string(&args.config).await?;
  let config = toml::from_str::<compat::config::Configuration>(&contents).map_err(|error| {
    log::warn!("invalid toml config file - {error}");
    io::Error::new(io::ErrorKind::Other, "bad-config")
  })?;

  let store = compat::store::Store::new(&config.mongo).await?;

  match args.command {
    CommandLineCommand::AddCampaign {
      url,
      engine,
      user_agent,
      mobile,
      auto_test,
    } => {
      if engine.is_empty() || user_agent.is_empty() {
        return Err(io::Error::new(
          io::ErrorKind::Other,
          "campaigns need at least one engine and one user agent",
        ));
      }

      let details = compat::types::CampaignDetails {
        target_uri: parsed_url(&url)?,
        kind: kind_for(mobile),
        user_agents: user_agent,
        engines: engine,
      };

      let campaign = compat::types::Campaign::new(details, auto_test);
      store.create_campaign(&campaign).await?;
      println!("created campaign '{}'", campaign.id);
    }

    CommandLineCommand::ListCampaigns => {
      for campaign in store.list_campaigns(50).await? {
        println!(
          "- {} {:?}/{:?} run #{} - {}",
          campaign.id, campaign.status, campaign.run_status, campaign.run_count, campaign.details.target_uri
        );
      }
    }

    CommandLineCommand::AddJob {
      url,
      engine,
      user_agent,
      mobile,
    } => {
      let details = compat::types::JobDetails {
        engine,
        user_agent,
        screen_size: kind_for(mobile).screen_size(),
        target_uri: parsed_url(&url)?,
      };

      let id = store.create_oneoff(&details).await?;
      println!("queued job '{id}'");
    }
  }

  Ok(())
}

fn main() -> io::Result<()> {
  let load_env = std::fs::metadata(".env").map(|meta| meta.is_file()).unwrap_or(false);

  if load_env {
    let env_result = dotenv::dotenv();
    println!(".env loaded? {:?}", env_result.is_ok());
  }

  env_logger::init();
  let args = CommandLineArguments::parse();

  async_std::task::block_on(run(args))
}
