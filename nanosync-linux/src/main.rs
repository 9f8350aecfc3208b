//! The nanosync daemon: one PTP ordinary clock port wired to timestamped
//! sockets and the system (or PTP hardware) clock.

use std::{collections::VecDeque, path::PathBuf, process::exit, time::Duration as StdDuration};

use clap::Parser;
use nanosync::{
    config::{ClockIdentity, TimePropertiesDS},
    datastructures::messages::MAX_DATA_LEN,
    port::{Port, PortAction, PortActionIterator},
    Clock as _,
};
use nanosync_linux::{
    acl::Acl,
    clock::LinuxClock,
    config::{Config, PortConfig},
    freqfile::FrequencyFile,
    leapseconds::LeapSecondsList,
    observer::observer_task,
    tracing::{tracing_init, LogLevel},
    transport::PtpTransport,
};
use rand::{rngs::StdRng, SeedableRng};
use timestamped_socket::{interface::InterfaceName, socket::InterfaceTimestampMode};
use tokio::{
    signal::unix::{signal, SignalKind},
    sync::watch,
};

#[derive(Parser, Debug)]
#[clap(author, version, about = "PTP v2 ordinary clock daemon", long_about = None)]
struct Args {
    /// Path of the configuration file
    #[clap(short, long, default_value = "/etc/nanosync/nanosync.toml")]
    config: PathBuf,

    /// Override the configured log level
    #[clap(short, long)]
    loglevel: Option<LogLevel>,
}

/// Read the interface MAC through SIOCGIFHWADDR for the clock identity
fn interface_mac(interface: InterfaceName) -> Option<[u8; 6]> {
    let mut request: libc::ifreq = unsafe { std::mem::zeroed() };
    for (dst, src) in request
        .ifr_name
        .iter_mut()
        .zip(interface.as_str().bytes().chain(std::iter::once(0)))
    {
        *dst = src as libc::c_char;
    }

    // A throwaway datagram socket carries the ioctl
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
    if fd < 0 {
        return None;
    }

    let result = unsafe { libc::ioctl(fd, libc::SIOCGIFHWADDR, &mut request) };
    unsafe { libc::close(fd) };
    if result < 0 {
        return None;
    }

    let hwaddr = unsafe { request.ifr_ifru.ifru_hwaddr };
    let mut mac = [0u8; 6];
    for (dst, src) in mac.iter_mut().zip(hwaddr.sa_data.iter()) {
        *dst = *src as u8;
    }
    Some(mac)
}

type DaemonPort = Port<Option<Vec<ClockIdentity>>, LinuxClock, StdRng>;

/// Execute the actions one engine call produced, feeding transmit
/// timestamps (and send errors) straight back into the engine.
async fn handle_actions(
    port: &mut DaemonPort,
    transport: &mut PtpTransport,
    freqfile: &mut Option<FrequencyFile>,
    observation_sender: &watch::Sender<Option<nanosync::observability::ObservableState>>,
    fallback_clock: &LinuxClock,
    actions: PortActionIterator,
) {
    let domain = transport.domain();
    let mut queue: VecDeque<PortAction> = actions.collect();

    while let Some(action) = queue.pop_front() {
        match action {
            PortAction::SendEvent {
                context,
                data,
                address,
            } => match transport.event.send_to(&data, address, true, domain).await {
                Ok(timestamp) => {
                    // Fall back to a software reading when the socket did
                    // not capture the transmission
                    let timestamp = timestamp.unwrap_or_else(|| fallback_clock.now());
                    queue.extend(port.handle_send_timestamp(context, timestamp));
                }
                Err(error) => {
                    log::warn!("could not send event message: {error}");
                    queue.extend(port.handle_send_error());
                }
            },
            PortAction::SendGeneral { data, address } => {
                if let Err(error) = transport
                    .general
                    .send_to(&data, address, false, domain)
                    .await
                {
                    log::warn!("could not send general message: {error}");
                    queue.extend(port.handle_send_error());
                }
            }
            PortAction::RefreshTransport => {
                if let Err(error) = transport.refresh() {
                    log::warn!("could not refresh multicast membership: {error}");
                }
            }
            PortAction::UpdateStatus => {
                let snapshot = port.observe();
                if let Some(freqfile) = freqfile {
                    freqfile.save(snapshot.servo.frequency_ppb, snapshot.servo.clock_state);
                }
                let _ = observation_sender.send_replace(Some(snapshot));
            }
        }
    }
}

fn startup_time_properties(config: &Config) -> TimePropertiesDS {
    let Some(path) = &config.leap_seconds_file else {
        return TimePropertiesDS::default();
    };

    let list = match LeapSecondsList::from_file(path) {
        Ok(list) => list,
        Err(error) => {
            log::warn!(
                "could not read leap second list {}: {error}",
                path.display()
            );
            return TimePropertiesDS::default();
        }
    };

    let unix_now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    if list.is_expired(unix_now) {
        log::warn!("leap second list is expired, distributing arbitrary timescale");
        return TimePropertiesDS::default();
    }

    let Some(utc_offset) = list.offset_at(unix_now) else {
        return TimePropertiesDS::default();
    };

    TimePropertiesDS::new_ptp_time(
        Some(utc_offset),
        list.pending_leap(unix_now).unwrap_or_default(),
        true,
        false,
        nanosync::config::TimeSource::InternalOscillator,
    )
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    let config = match Config::from_file(&args.config) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("could not load {}: {error}", args.config.display());
            exit(1);
        }
    };

    tracing_init(args.loglevel.unwrap_or(config.loglevel));

    let Some(port_config) = config.ports.first().cloned() else {
        log::error!("no [[port]] configured");
        exit(1);
    };

    let mut clock = match port_config.hardware_clock {
        Some(index) => match LinuxClock::open(format!("/dev/ptp{index}")) {
            Ok(clock) => clock,
            Err(error) => {
                log::error!("could not open /dev/ptp{index}: {error}");
                exit(1);
            }
        },
        None => LinuxClock::CLOCK_REALTIME,
    };
    clock.set_read_only(port_config.monitor_only);

    let clock_identity = config.identity.unwrap_or_else(|| {
        match interface_mac(port_config.interface) {
            Some(mac) => ClockIdentity::from_mac_address(mac),
            None => {
                log::error!(
                    "could not derive a clock identity from {}; configure `identity`",
                    port_config.interface.as_str()
                );
                exit(1);
            }
        }
    });
    log::info!("clock identity {clock_identity}");

    let timestamping = if port_config.hardware_clock.is_some() {
        InterfaceTimestampMode::HardwarePTPAll
    } else {
        InterfaceTimestampMode::SoftwareAll
    };

    // Requested hardware timestamping that the interface cannot provide
    // fails right here, before the protocol ever starts
    let mut transport = match PtpTransport::open(
        port_config.network_mode,
        port_config.interface,
        timestamping,
        port_config.hardware_clock,
        config.domain,
    ) {
        Ok(transport) => transport,
        Err(error) => {
            log::error!(
                "could not open {} sockets on {}: {error}",
                match port_config.network_mode {
                    nanosync_linux::transport::NetworkMode::Ipv4 => "UDPv4",
                    nanosync_linux::transport::NetworkMode::Ipv6 => "UDPv6",
                    nanosync_linux::transport::NetworkMode::Ethernet => "ethernet",
                },
                port_config.interface.as_str()
            );
            exit(1);
        }
    };

    let acl = match Acl::new(
        &port_config.acl_permit,
        &port_config.acl_deny,
        port_config.acl_order,
    ) {
        Ok(acl) => acl,
        Err(error) => {
            log::error!("invalid transport ACL: {error}");
            exit(1);
        }
    };
    let mut acl_denied: u64 = 0;

    let fallback_clock = clock.clone();
    let mut port: DaemonPort = Port::new(
        config.instance_config(clock_identity),
        port_config.port_config(),
        config.servo_config(port_config.hardware_clock.is_some()),
        startup_time_properties(&config),
        clock,
        StdRng::from_entropy(),
    );

    let mut freqfile = config.frequency_file.as_ref().map(FrequencyFile::new);
    if let Some(freqfile) = &freqfile {
        if let Some(ppb) = freqfile.load() {
            port.preload_frequency(ppb);
        }
    }

    let (observation_sender, observation_receiver) = watch::channel(None);
    tokio::spawn(observer_task(
        config.observability.clone(),
        observation_receiver,
    ));

    let mut sigterm = signal(SignalKind::terminate()).expect("could not install signal handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("could not install signal handler");
    let mut sighup = signal(SignalKind::hangup()).expect("could not install signal handler");

    let enable_actions = port.enable();
    handle_actions(
        &mut port,
        &mut transport,
        &mut freqfile,
        &observation_sender,
        &fallback_clock,
        enable_actions,
    )
    .await;

    let mut event_buffer = [0u8; MAX_DATA_LEN];
    let mut general_buffer = [0u8; MAX_DATA_LEN];

    log::info!(
        "nanosync running on {} (domain {})",
        port_config.interface.as_str(),
        config.domain
    );

    loop {
        // The single suspension point: transport readability or the next
        // timer deadline
        let timeout = port
            .next_deadline()
            .unwrap_or(StdDuration::from_millis(250))
            .max(StdDuration::from_micros(250));

        let actions = tokio::select! {
            _ = tokio::time::sleep(timeout) => port.handle_timers(),

            result = transport.event.recv(&mut event_buffer) => match result {
                Ok(data) => {
                    if !data.source_ip.map(|ip| acl.permits(ip)).unwrap_or(true) {
                        acl_denied += 1;
                        log::debug!("event message denied by ACL ({acl_denied} so far)");
                        PortActionIterator::empty()
                    } else {
                        let timestamp = data
                            .timestamp
                            .unwrap_or_else(|| fallback_clock.now());
                        port.handle_event_receive(
                            &event_buffer[..data.bytes_read],
                            timestamp,
                            Some(data.source),
                        )
                    }
                }
                Err(error) => {
                    log::warn!("event socket receive failed: {error}");
                    PortActionIterator::empty()
                }
            },

            result = transport.general.recv(&mut general_buffer) => match result {
                Ok(data) => {
                    if !data.source_ip.map(|ip| acl.permits(ip)).unwrap_or(true) {
                        acl_denied += 1;
                        log::debug!("general message denied by ACL ({acl_denied} so far)");
                        PortActionIterator::empty()
                    } else {
                        port.handle_general_receive(
                            &general_buffer[..data.bytes_read],
                            Some(data.source),
                        )
                    }
                }
                Err(error) => {
                    log::warn!("general socket receive failed: {error}");
                    PortActionIterator::empty()
                }
            },

            _ = sigterm.recv() => break,
            _ = sigint.recv() => break,

            _ = sighup.recv() => {
                log::info!("SIGHUP: refreshing multicast membership");
                if let Err(error) = transport.refresh() {
                    log::warn!("could not refresh multicast membership: {error}");
                }
                PortActionIterator::empty()
            }
        };

        handle_actions(
            &mut port,
            &mut transport,
            &mut freqfile,
            &observation_sender,
            &fallback_clock,
            actions,
        )
        .await;
    }

    log::info!("shutting down");
    if let Some(freqfile) = freqfile.as_mut() {
        freqfile.store_now(port.frequency_ppb());
    }
}
