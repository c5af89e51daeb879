use human_panic::setup_panic;
use std::net::Ipv4Addr;
use std::str::FromStr;
use structopt::StructOpt;
use tracing::info;
use upnp_core::config::Config;
use upnp_core::cp::device_list::{DeviceList, DeviceListFilter};
use upnp_core::cp::fetch::ReqwestFetcher;
use upnp_core::cp::listener::Listener;
use upnp_core::wire::search_target::SearchTarget;

#[derive(Debug, StructOpt)]
#[structopt(name = "upnpd")]
struct CommandLine {
    /// The level of logging to perform, from off to trace.
    #[structopt(long, short = "v", parse(from_occurrences))]
    verbose: i8,

    #[structopt(long, short)]
    interface: Option<String>,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Send one M-SEARCH burst and print every response collected within
    /// `max_wait` seconds.
    Search {
        #[structopt(long, short = "t", default_value = "all")]
        search_target: CLSearchTarget,

        #[structopt(long, short)]
        max_wait: Option<u8>,
    },
    /// Listen for unsolicited NOTIFY traffic and print every advertisement
    /// seen.
    Listen,
}

#[derive(Debug)]
enum CLSearchTarget {
    All,
    RootDevice,
    Other(SearchTarget),
}

impl FromStr for CLSearchTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(CLSearchTarget::All),
            "root" => Ok(CLSearchTarget::RootDevice),
            other => other
                .parse::<SearchTarget>()
                .map(CLSearchTarget::Other)
                .map_err(|_| format!("unrecognized search target: {}", other)),
        }
    }
}

#[tokio::main]
async fn main() {
    setup_panic!();

    let args = CommandLine::from_args();
    init_tracing(args.verbose);

    let interface: Ipv4Addr = args
        .interface
        .as_deref()
        .map(|s| s.parse().expect("--interface must be an IPv4 address"))
        .unwrap_or(Ipv4Addr::UNSPECIFIED);

    match args.cmd {
        Command::Search { search_target, max_wait } => do_search(interface, search_target, max_wait).await,
        Command::Listen => do_listen(interface).await,
    }
}

fn init_tracing(verbosity: i8) {
    use tracing_subscriber::filter::LevelFilter;
    let level = match verbosity {
        0 => LevelFilter::OFF,
        1 => LevelFilter::ERROR,
        2 => LevelFilter::WARN,
        3 => LevelFilter::INFO,
        4 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
    info!(?level, "logging initialized");
}

async fn do_search(interface: Ipv4Addr, search_target: CLSearchTarget, max_wait: Option<u8>) {
    let config = Config::default();
    let st = match search_target {
        CLSearchTarget::All => SearchTarget::All,
        CLSearchTarget::RootDevice => SearchTarget::RootDevice,
        CLSearchTarget::Other(st) => st,
    };

    let listener = match Listener::bind(interface).await {
        Ok(l) => std::sync::Arc::new(l),
        Err(e) => {
            eprintln!("failed to bind SSDP listener: {}", e);
            return;
        }
    };

    let list = DeviceList::new(DeviceListFilter::All, config.clone(), std::sync::Arc::new(ReqwestFetcher::new()));
    listener.register(list.clone());

    let mx = max_wait.unwrap_or(config.default_mx);
    if let Err(e) = listener.search(&st, mx).await {
        eprintln!("search failed: {}", e);
        return;
    }

    let run_handle = tokio::spawn(listener.run());
    tokio::time::sleep(std::time::Duration::from_secs(mx as u64 + 1)).await;
    run_handle.abort();

    let devices = list.list();
    println!("search returned {} device(s):", devices.len());
    for device in devices {
        println!("  {} -> {} ({:?})", device.udn(), device.location(), device.ready_state());
    }
}

async fn do_listen(interface: Ipv4Addr) {
    let config = Config::default();
    let listener = match Listener::bind(interface).await {
        Ok(l) => std::sync::Arc::new(l),
        Err(e) => {
            eprintln!("failed to bind SSDP listener: {}", e);
            return;
        }
    };
    let list = DeviceList::new(DeviceListFilter::All, config, std::sync::Arc::new(ReqwestFetcher::new()));
    let mut events = list.subscribe();
    listener.register(list);

    let run_handle = tokio::spawn(listener.run());
    while let Some(event) = events.recv().await {
        println!("{:?}", event);
    }
    run_handle.abort();
}
