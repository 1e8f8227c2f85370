mod cli;
mod pipeline;

use clap::Parser;

#[tokio::main]
async fn main() {
    // Panic hook: restore the terminal before printing the panic, in case
    // the TUI renderer was active.
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        sweep_tui::restore_terminal();
        default_hook(info);
    }));

    if let Err(err) = cli::run(cli::Cli::parse()).await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
