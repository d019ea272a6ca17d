use clap;

pub trait App {
    fn with_defaults(self) -> Self;
}

impl<'a, 'b> App for clap::App<'a, 'b> {
    fn with_defaults(self) -> Self {
        self.arg(
            clap::Arg::with_name("tap")
                .long("tap")
                .value_name("TAP")
                .help("Linux TAP interface")
                .default_value("tap0")
                .takes_value(true),
        ).arg(
                clap::Arg::with_name("dev-mac")
                    .long("dev-mac")
                    .value_name("MAC")
                    .help("MAC address of the device")
                    .default_value("06:11:22:33:44:55")
                    .takes_value(true),
            )
            .arg(
                clap::Arg::with_name("dev-ipv4")
                    .long("dev-ipv4")
                    .value_name("IPV4")
                    .help("Static IPv4 address of the device")
                    .default_value("10.0.0.102")
                    .takes_value(true),
            )
            .arg(
                clap::Arg::with_name("subnet-len")
                    .long("subnet-len")
                    .value_name("BITS")
                    .help("Prefix length of the static IPv4 subnet")
                    .default_value("24")
                    .takes_value(true),
            )
            .arg(
                clap::Arg::with_name("gateway")
                    .long("gateway")
                    .value_name("IPV4")
                    .help("Static default gateway, defaults to the host side of the TAP")
                    .takes_value(true),
            )
            .arg(
                clap::Arg::with_name("dhcp")
                    .long("dhcp")
                    .help("Lease an address via DHCP instead of using a static one"),
            )
            .arg(
                clap::Arg::with_name("answer-echo")
                    .long("answer-echo")
                    .help("Answer ping requests addressed to the device"),
            )
    }
}
