use anyhow::{anyhow, Result};
use clap::{App, Arg};
use kafleet_core::config::FleetConfigProperties;
use kafleet_core::fleet::{CommandOutcome, FleetCommand, KafkaFleet, MenuChoice};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::signal;
use tracing::Level;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

type Prompt = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() {
    match main_processor().await {
        Ok(()) => info!("Exiting successfully."),
        Err(err) => error!("Exiting with error: {:?}", err),
    }
}

async fn main_processor() -> Result<()> {
    let matches = App::new("kafleet")
        .version("0.1")
        .author("Seb Ospina <kraige@gmail.com>")
        .about("Starts and manages a local fleet of Kafka brokers")
        .arg(Arg::new("INPUT").help("Sets the fleet config file to use").index(1))
        .arg(
            Arg::new("verbosity_level")
                .short('v')
                .takes_value(true)
                .default_value("info")
                .help("Sets the level of verbosity"),
        )
        .arg(
            Arg::new("override")
                .short('o')
                .takes_value(true)
                .multiple_occurrences(true)
                .help("Override properties defined in the config file, as key=value"),
        )
        .get_matches();
    let verbosity = matches.value_of("verbosity_level").unwrap_or("info");
    let subscriber = FmtSubscriber::builder().with_max_level(verbosity.parse::<Level>()?).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut fleet_config = match matches.value_of("INPUT") {
        Some(config_file) => {
            info!("Using input file: {}", config_file);
            FleetConfigProperties::read_config_file(config_file)?
        },
        None => FleetConfigProperties::default(),
    };
    if let Some(property_overrides) = matches.values_of("override") {
        for override_property in property_overrides {
            fleet_config.try_set_override(override_property)?;
        }
    }
    let fleet_config = fleet_config.build()?;
    let broker_count = fleet_config.broker.count;

    let mut fleet = KafkaFleet::from_config(fleet_config);
    for outcome in fleet.bootstrap().await? {
        if let Err(err) = outcome {
            warn!("{}", err);
        }
    }
    println!("{}", CommandOutcome::Brokers(fleet.supervisor().list_brokers()));

    let mut prompt = BufReader::new(tokio::io::stdin()).lines();
    tokio::select! {
        res = menu_loop(&fleet, &mut prompt, broker_count) => res?,
        _ = signal::ctrl_c() => info!("ctrl-c received!"),
    }
    fleet.shutdown().await;
    Ok(())
}

/// Prints `question` and reads one line, `None` once stdin is closed.
async fn ask(prompt: &mut Prompt, question: &str) -> Result<Option<String>> {
    print!("{}", question);
    std::io::stdout().flush()?;
    Ok(prompt.next_line().await?.map(|line| line.trim().to_string()))
}

async fn ask_broker_id(prompt: &mut Prompt, broker_count: u32) -> Result<Option<u32>> {
    let question = format!("Enter the broker ID (0 to {}): ", broker_count.saturating_sub(1));
    match ask(prompt, &question).await? {
        Some(answer) if answer.is_empty() => Ok(None),
        Some(answer) => {
            Ok(Some(answer.parse().map_err(|_| anyhow!("Invalid broker ID {:?}", answer))?))
        },
        None => Ok(None),
    }
}

async fn read_command(prompt: &mut Prompt, broker_count: u32) -> Result<Option<FleetCommand>> {
    println!("\nKafka Fleet\n{}", MenuChoice::menu());
    let choice = match ask(prompt, "Enter your choice: ").await? {
        Some(choice) => choice,
        None => return Ok(Some(FleetCommand::Exit)),
    };
    let command = match choice.parse::<MenuChoice>() {
        Ok(MenuChoice::ListTopics) => {
            println!("Leave the broker ID empty to list every running broker.");
            FleetCommand::ListTopics { broker_id: ask_broker_id(prompt, broker_count).await? }
        },
        Ok(MenuChoice::CreateTopic) => {
            let name = ask(prompt, "Enter topic name: ").await?.unwrap_or_default();
            let replication_factor =
                match ask(prompt, "Enter replication factor (default=1): ").await? {
                    Some(answer) if !answer.is_empty() => answer
                        .parse()
                        .map_err(|_| anyhow!("Invalid replication factor {:?}", answer))?,
                    _ => 1,
                };
            let broker_id = ask_broker_id(prompt, broker_count).await?.unwrap_or(0);
            FleetCommand::CreateTopic { name, replication_factor, broker_id }
        },
        Ok(MenuChoice::SmokeTest) => {
            let topic = ask(prompt, "Enter the topic name to send and consume a test message: ")
                .await?
                .unwrap_or_default();
            let broker_id = ask_broker_id(prompt, broker_count).await?.unwrap_or(0);
            FleetCommand::SmokeTest { topic, broker_id, timeout: None }
        },
        Ok(MenuChoice::Exit) => FleetCommand::Exit,
        Err(err) => {
            println!("{}. Please select again.", err);
            return Ok(None);
        },
    };
    Ok(Some(command))
}

async fn menu_loop(fleet: &KafkaFleet, prompt: &mut Prompt, broker_count: u32) -> Result<()> {
    loop {
        let command = match read_command(prompt, broker_count).await {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                println!("{}", err);
                continue;
            },
        };
        match fleet.dispatch(command).await {
            Ok(CommandOutcome::Exit) => {
                println!("Exiting Kafka Fleet.");
                return Ok(());
            },
            Ok(outcome) => println!("{}", outcome),
            Err(err) => println!("Error: {}", err),
        }
    }
}
