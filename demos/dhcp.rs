#[macro_use]
extern crate clap;
#[macro_use]
extern crate lazy_static;

mod cli;
mod env;

use std::time::Duration;

use adapternet::core::service::dhcp::State;
use adapternet::core::time::{
    SystemEnv,
    Ticker,
};

use crate::cli::App;

/// Leases an IPv4 address via DHCP and prints the configuration.
fn main() {
    env_logger::init();

    let matches = clap::App::new("dhcp")
        .about("Leases an IPv4 address via DHCP")
        .with_defaults()
        .arg(
            clap::Arg::with_name("timeout")
                .long("timeout")
                .value_name("SECONDS")
                .help("How long to wait for a lease")
                .default_value("30")
                .takes_value(true),
        )
        .get_matches();

    let timeout = value_t_or_exit!(matches, "timeout", u64);

    let mut interface = env::default_interface(&matches);
    interface.config.dhcp = true;
    interface.start();

    let mut ticker = Ticker::new(SystemEnv::new());
    let bound = env::run_until(
        &mut interface,
        &mut ticker,
        Duration::from_secs(timeout),
        |interface| interface.dhcp.state == State::Bound,
    );

    if !bound {
        eprintln!("Timeout!");
        std::process::exit(1);
    }

    let ipv4 = &interface.ipv4;
    println!("Address: {}", ipv4.addr);
    println!("Gateway: {}", ipv4.default_gateway);
    for dns_server in ipv4.dns_servers.iter() {
        println!("DNS: {}", dns_server);
    }
    if let Some(ref domain_name) = ipv4.domain_name {
        println!("Domain: {}", domain_name);
    }

    interface.deinit();
}
