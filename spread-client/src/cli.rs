use clap::{Args, Parser, Subcommand, ValueEnum};
use nanoid::nanoid;
use spread_client::{ConnectOptions, Reliability};

const NAME_ALPHABET: [char; 36] = [
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r',
    's', 't', 'u', 'v', 'w', 'x', 'y', 'z', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9',
];

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub daemon: DaemonArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Interactive client: join, leave and send from the terminal.
    User(UserArgs),
    /// Send a stream of messages to a group as fast as possible.
    Flood(FloodArgs),
    /// Join groups and print everything delivered to them.
    Listen(ListenArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DaemonArgs {
    /// Host running the daemon.
    #[arg(long, env = "SPREAD_DAEMON", default_value = "localhost")]
    pub host: String,

    /// Daemon port. Use 0 for the default port.
    #[arg(long, env = "SPREAD_PORT", default_value_t = 0)]
    pub port: u16,

    /// Private name to ask for; a random one is generated when omitted.
    #[arg(long)]
    pub name: Option<String>,

    /// Request a priority session.
    #[arg(long)]
    pub priority: bool,

    /// Do not receive membership messages.
    #[arg(long)]
    pub no_membership: bool,
}

impl DaemonArgs {
    pub fn connect_options(&self) -> ConnectOptions {
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| nanoid!(8, &NAME_ALPHABET));
        ConnectOptions::new(name)
            .host(self.host.clone())
            .port(self.port)
            .priority(self.priority)
            .group_membership(!self.no_membership)
    }
}

#[derive(Args, Debug, Clone)]
pub struct UserArgs {
    /// Pull messages with the `r` command instead of printing them as they
    /// arrive.
    #[arg(long)]
    pub pull: bool,
}

#[derive(Args, Debug, Clone)]
pub struct FloodArgs {
    /// Group to flood.
    #[arg(long, default_value = "flooder")]
    pub group: String,

    /// Number of messages to send.
    #[arg(long, default_value_t = 10_000)]
    pub count: usize,

    /// Payload size of each message in bytes.
    #[arg(long, default_value_t = 1_000)]
    pub size: usize,

    /// Delivery guarantee.
    #[arg(long, value_enum, default_value_t = Level::Agreed)]
    pub reliability: Level,

    /// Ask the daemon not to deliver our own messages back to us.
    #[arg(long)]
    pub self_discard: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ListenArgs {
    /// Groups to join.
    #[arg(required = true)]
    pub groups: Vec<String>,

    /// Stop after this many messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Unreliable,
    Reliable,
    Fifo,
    Causal,
    Agreed,
    Safe,
}

impl From<Level> for Reliability {
    fn from(level: Level) -> Self {
        match level {
            Level::Unreliable => Reliability::Unreliable,
            Level::Reliable => Reliability::Reliable,
            Level::Fifo => Reliability::Fifo,
            Level::Causal => Reliability::Causal,
            Level::Agreed => Reliability::Agreed,
            Level::Safe => Reliability::Safe,
        }
    }
}
