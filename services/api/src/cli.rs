use crate::demo::{run_demo, run_sweep, DemoArgs, SweepArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use salon_scheduler::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Salon Booking Service",
    about = "Run and demonstrate salon stylist assignment and appointment scheduling",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk through booking, suggestion, confirmation, cancellation and rating
    Demo(DemoArgs),
    /// Run the nightly sweep and next-day reminders against a staged calendar
    Sweep(SweepArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Services CSV export (id,name,duration_minutes)
    #[arg(long, requires = "stylists_csv")]
    pub(crate) services_csv: Option<PathBuf>,
    /// Stylists CSV export (id,name,rating,on_duty,expertise)
    #[arg(long, requires = "services_csv")]
    pub(crate) stylists_csv: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args),
        Command::Sweep(args) => run_sweep(args),
    }
}
