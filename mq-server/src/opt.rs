use clap::Parser;
use clio::Input;

#[derive(Debug, Parser)]
#[command(
    name = "mq-server",
    about = "Subscription gated model questions service"
)]
pub struct Opt {
    /// Config file path
    #[arg(short, long, value_parser, default_value = "config.toml")]
    pub config: Input,
}
