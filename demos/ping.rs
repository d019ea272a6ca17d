#[macro_use]
extern crate clap;
#[macro_use]
extern crate lazy_static;

mod cli;
mod env;

use std::time::Duration;

use adapternet::core::repr::Ipv4Address;
use adapternet::core::service::icmpv4;
use adapternet::core::time::{
    SystemEnv,
    Ticker,
};

use crate::cli::App;

/// Sends echo requests to a host. Run with RUST_LOG=info to see the replies.
fn main() {
    env_logger::init();

    let matches = clap::App::new("ping")
        .about("Sends ICMP echo requests to a host")
        .with_defaults()
        .arg(
            clap::Arg::with_name("target")
                .value_name("IPV4")
                .help("Host to ping")
                .required(true)
                .index(1),
        )
        .arg(
            clap::Arg::with_name("count")
                .long("count")
                .short("c")
                .value_name("COUNT")
                .help("Number of echo requests to send")
                .default_value("4")
                .takes_value(true),
        )
        .get_matches();

    let target = value_t_or_exit!(matches, "target", Ipv4Address);
    let count = value_t_or_exit!(matches, "count", u32);

    let mut interface = env::default_interface(&matches);
    interface.start();

    let mut ticker = Ticker::new(SystemEnv::new());

    if interface.config.dhcp {
        let configured = env::run_until(
            &mut interface,
            &mut ticker,
            Duration::from_secs(30),
            |interface| interface.ipv4.is_configured(),
        );
        if !configured {
            eprintln!("No DHCP lease!");
            std::process::exit(1);
        }
    }

    for _ in 0 .. count {
        match icmpv4::send_ping(&mut interface, target) {
            Ok(seq) => println!("Sent echo request {} to {}.", seq, target),
            Err(err) => eprintln!("Error pinging {}: {:?}.", target, err),
        }

        env::run_until(
            &mut interface,
            &mut ticker,
            Duration::from_secs(1),
            |_| false,
        );
    }

    interface.deinit();
}
