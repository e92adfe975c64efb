use crate::auth::pow::MAX_SUPPORTED_DIFFICULTY;
use clap::{Arg, Command};

#[must_use]
pub fn with_args(command: Command) -> Command {
    let max = i64::from(MAX_SUPPORTED_DIFFICULTY);
    command
        .arg(
            Arg::new("pow-secret")
                .long("pow-secret")
                .help("HMAC key for signing proof-of-work challenges")
                .env("KEYWARD_POW_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("pow-difficulty")
                .long("pow-difficulty")
                .help("Leading zero bits required when a client does not ask for more")
                .default_value("16")
                .env("KEYWARD_POW_DIFFICULTY")
                .value_parser(clap::value_parser!(u32).range(1..=max)),
        )
        .arg(
            Arg::new("pow-max-difficulty")
                .long("pow-max-difficulty")
                .help("Highest difficulty a challenge may be issued with")
                .default_value("24")
                .env("KEYWARD_POW_MAX_DIFFICULTY")
                .value_parser(clap::value_parser!(u32).range(1..=max)),
        )
        .arg(
            Arg::new("pow-ttl-seconds")
                .long("pow-ttl-seconds")
                .help("Challenge lifetime")
                .default_value("300")
                .env("KEYWARD_POW_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new("pow-not-before-seconds")
                .long("pow-not-before-seconds")
                .help("Delay before a challenge may be redeemed")
                .default_value("0")
                .env("KEYWARD_POW_NOT_BEFORE_SECONDS")
                .value_parser(clap::value_parser!(i64).range(0..)),
        )
}
