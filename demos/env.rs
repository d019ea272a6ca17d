use std::net::IpAddr as StdIpAddr;
use std::thread;
use std::time::{
    Duration,
    Instant,
};

use adapternet::core::repr::{
    EthernetAddress,
    Ipv4Address,
    Ipv4AddressCidr,
};
use adapternet::core::service::{
    Config,
    Interface,
};
use adapternet::core::time::{
    SystemEnv,
    Ticker,
};

lazy_static! {
    /// Default interface IPv4 gateway, used when the TAP has no address.
    pub static ref DEFAULT_IPV4_GATEWAY: Ipv4Address = {
        Ipv4Address::new([10, 0, 0, 101])
    };

    /// Host name announced to DHCP servers.
    pub static ref HOST_NAME: String = {
        "adapternet".to_string()
    };
}

/// Get's the IPv4 address of the host side of an interface. See tap.sh for
/// more info.
pub fn ifr_addr(ifr_name: &str) -> Option<Ipv4Address> {
    let interfaces = get_if_addrs::get_if_addrs().ok()?;

    interfaces
        .into_iter()
        .filter(|interface| interface.name == ifr_name)
        .filter_map(|interface| match interface.ip() {
            StdIpAddr::V4(ipv4_addr) => Some(Ipv4Address::new(ipv4_addr.octets())),
            _ => None,
        })
        .next()
}

/// Builds the interface configuration from the command line.
pub fn config(matches: &clap::ArgMatches) -> Config {
    let mut config = static_or_dhcp_config(matches);
    config.answer_echo = matches.is_present("answer-echo");
    config
}

fn static_or_dhcp_config(matches: &clap::ArgMatches) -> Config {
    if matches.is_present("dhcp") {
        return Config::dhcp_client(&HOST_NAME);
    }

    let ipv4_addr = value_t_or_exit!(matches, "dev-ipv4", Ipv4Address);
    let subnet_len = value_t_or_exit!(matches, "subnet-len", u8);
    let gateway = match matches.value_of("gateway") {
        Some(_) => value_t_or_exit!(matches, "gateway", Ipv4Address),
        None => ifr_addr(matches.value_of("tap").unwrap()).unwrap_or(*DEFAULT_IPV4_GATEWAY),
    };

    Config::with_static(
        &HOST_NAME,
        Ipv4AddressCidr::new(ipv4_addr, subnet_len),
        gateway,
    )
}

#[cfg(target_os = "linux")]
pub fn default_interface(matches: &clap::ArgMatches) -> Interface {
    use adapternet::linux::dev::Tap;

    let eth_addr = value_t_or_exit!(matches, "dev-mac", EthernetAddress);
    let tap = Tap::new(matches.value_of("tap").unwrap(), eth_addr).unwrap_or_else(|err| {
        eprintln!("Opening TAP: {:?}.", err);
        std::process::exit(1);
    });

    let interface = Interface::new(Box::new(tap), config(matches));

    println!(
        "Interface: (MTU = {}, MAC = {}, DHCP = {})",
        interface.dev.max_transmission_unit(),
        interface.ethernet_addr,
        interface.config.dhcp,
    );

    interface
}

#[cfg(not(target_os = "linux"))]
pub fn default_interface(_: &clap::ArgMatches) -> Interface {
    panic!("Sorry, demos are only supported on Linux.");
}

/// Drives an interface until f returns true or the timeout passes, returning
/// whether f succeeded.
pub fn run_until<F>(
    interface: &mut Interface,
    ticker: &mut Ticker<SystemEnv>,
    timeout: Duration,
    mut f: F,
) -> bool
where
    F: FnMut(&mut Interface) -> bool,
{
    let since = Instant::now();

    while Instant::now().duration_since(since) < timeout {
        if let Err(err) = interface.poll() {
            eprintln!("Error reading frames: {:?}.", err);
        }
        let elapsed_ms = ticker.tick();
        interface.tick(elapsed_ms);

        if f(interface) {
            return true;
        }

        thread::sleep(Duration::from_millis(1));
    }

    false
}
