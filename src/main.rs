//! covidviz-agent - deployment and ETL agent for the COVID visualization stack
//!
//! Usage:
//! - Agent mode: `covidviz-agent`
//! - With custom port: `covidviz-agent --port 9700`
//! - Deploy the stack: `covidviz-agent deploy`
//! - One ETL pass: `covidviz-agent etl`

use covidviz_agent::RuntimeConfig;

/// What the process was asked to do
enum Mode {
    Agent,
    Deploy,
    EtlOnce,
}

/// Parse command line arguments
fn parse_args() -> (Mode, RuntimeConfig) {
    let args: Vec<String> = std::env::args().collect();
    let mut config = RuntimeConfig::default();
    let mut mode = Mode::Agent;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                config.port_override = args[i + 1].parse().ok();
                i += 2;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "deploy" => {
                mode = Mode::Deploy;
                i += 1;
            }
            "etl" => {
                mode = Mode::EtlOnce;
                i += 1;
            }
            _ => {
                i += 1;
            }
        }
    }

    (mode, config)
}

fn print_help() {
    println!("covidviz-agent - deployment and ETL agent for the COVID visualization stack");
    println!();
    println!("USAGE:");
    println!("    covidviz-agent [OPTIONS] [COMMAND]");
    println!();
    println!("OPTIONS:");
    println!("    --port <PORT>    Override the status API port");
    println!("    -h, --help       Print help information");
    println!();
    println!("COMMANDS:");
    println!("    deploy           Deploy the visualization stack and exit");
    println!("    etl              Run one probe-and-load ETL pass and exit");
    println!();
    println!("EXAMPLES:");
    println!("    covidviz-agent                # Agent mode (scheduler + API)");
    println!("    covidviz-agent --port 9700    # Custom status API port");
    println!("    covidviz-agent deploy         # One-shot stack deployment");
    println!("    covidviz-agent etl            # Single ETL pass (cron entry)");
}

fn main() {
    let (mode, config) = parse_args();

    covidviz_agent::init_tracing();

    let rt = tokio::runtime::Runtime::new().expect("Failed to create runtime");
    let exit_code = rt.block_on(async {
        match mode {
            Mode::Agent => covidviz_agent::init_and_run_agent(config).await,
            Mode::Deploy => covidviz_agent::run_deploy().await,
            Mode::EtlOnce => covidviz_agent::run_etl_once().await,
        }
    });

    std::process::exit(exit_code);
}
