use clap::Parser;
use view_ngin::{
    apps,
    config::{Cli, ViewerConfig},
};

fn main() -> anyhow::Result<()> {
    let config = ViewerConfig::from(Cli::parse());
    apps::run(config)
}
