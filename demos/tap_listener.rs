//! A TAP-backed packet listener
//!
//! Opens a virtual NIC on a Linux TAP device, assigns it an address, and
//! reads frames whenever the host reports packets available:
//! - Packets-available events with the host's estimate
//! - Frame size, flags and EtherType for each packet read
//!
//! To run this example:
//!
//! ```sh
//! cargo run --example tap_listener -- [packet-count]
//! ```
//!
//! Note: Root/sudo privileges are required to create and configure the TAP
//! device. The program creates `vnic0`, logs the first
//! `packet-count` frames sent to it (32 by default) and closes the device.

mod utils;

#[cfg(target_os = "linux")]
fn main() -> std::io::Result<()> {
    use std::sync::{mpsc, Arc};
    use vnic_bridge::{Interface, InterfaceEvent, TapConfig, TapHost};

    utils::init_logging();
    let max_packets = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(32);

    let host = Arc::new(TapHost::new(TapConfig {
        name: "vnic0".to_string(),
        ..Default::default()
    }));
    let iface = Interface::new(host);
    let (events_tx, events_rx) = mpsc::channel::<InterfaceEvent>();

    let attributes = iface.open(None, events_tx)?;
    println!(
        "TAP device vnic0 opened: id={} mac={} mtu={}",
        attributes.identifier, attributes.mac_address, attributes.mtu
    );
    utils::configure_interface("vnic0", "10.0.0.254/24")?;

    let mut buf = vec![0u8; attributes.max_packet_size as usize];
    let mut packet_count = 0u64;

    // Every queued frame raises one event; the estimate is only logged.
    for event in events_rx.iter().take(max_packets) {
        let result = match iface.read(&mut buf) {
            Ok(result) => result,
            Err(err) if err.is_retryable() => continue,
            Err(err) => return Err(err.into()),
        };
        packet_count += 1;

        let frame = &buf[..result.packet_size];
        let ethertype = if frame.len() >= 14 {
            u16::from_be_bytes([frame[12], frame[13]])
        } else {
            0
        };
        println!(
            "[Packet #{}] {} bytes, flags={:#x}, ethertype={:#06x}, ~{} queued",
            packet_count, result.packet_size, result.flags, ethertype, event.estimated_packets
        );
    }

    iface.close()?;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn main() {
    eprintln!("tap_listener needs a Linux TAP device");
}
