/// CLI module - command-line interface for postvault
mod cli;

fn main() {
    env_logger::init();
    cli::run_cli();
}
