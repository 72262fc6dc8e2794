use clap::Parser;
use std::io;

#[derive(Parser)]
#[command(author, version = option_env!("COMPAT_VERSION").unwrap_or_else(|| "dev"), about, long_about = None)]
struct CommandLineArguments {
  #[clap(short, long)]
  config: String,
}

async fn run(args: CommandLineArguments) -> io::Result<()> {
  log::info!("attempting to load '{}'", args.config);

  let contents = async_std::fs::read_to_string(&args.config).await?;
  let config = toml::from_str::<compat::config::Configuration>(&contents).map_err(|error| {
    log::warn!("invalid toml config file - {error}");
    io::Error::new(io::ErrorKind::Other, "bad-config")
  })?;

  let store = compat::store::Store::new(&config.mongo).await?;
  let sequence = compat::scheduler::sequence::TabSequence::from_config(&config.farm);

  let process_id = config
    .executor
    .process_id
    .clone()
    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
  let cadence = config.executor.cadence.unwrap_or_default();

  log::info!("runner '{process_id}' starting a campaign cycle");

  let executor = compat::executor::SerialExecutor::new(process_id, store, sequence, cadence);
  executor.run().await
}

fn main() -> io::Result<()> {
  let load_env = std::fs::metadata(".env").map(|meta| meta.is_file()).unwrap_or(false);

  if load_env {
    let env_result = dotenv::dotenv();
    println!(".env loaded? {:?}", env_result.is_ok());
  }

  env_logger::init();
  log::info!("environment + logger ready.");
  let args = CommandLineArguments::parse();

  async_std::task::block_on(run(args))
}
