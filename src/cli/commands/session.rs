use clap::{Arg, Command};

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("public-base-url")
                .long("public-base-url")
                .help("External URL of the provider; https enables Secure cookies")
                .default_value("http://localhost:8080")
                .env("KEYWARD_PUBLIC_BASE_URL"),
        )
        .arg(
            Arg::new("session-ttl-seconds")
                .long("session-ttl-seconds")
                .help("Session and cookie lifetime")
                .default_value("34560000")
                .env("KEYWARD_SESSION_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
}
