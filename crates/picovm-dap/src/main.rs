use clap::Parser;

fn main() -> miette::Result<()> {
    picovm_dap::Cli::parse().run()
}
