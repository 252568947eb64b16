//! Loopback round trip
//!
//! Opens an interface on the in-process loopback host, writes a few frames,
//! and reads them back while a second thread prints packets-available
//! events as they arrive.
//!
//! ```sh
//! cargo run --example loopback_echo -- [identifier-hint]
//! ```

use std::io::Result;
use std::sync::{mpsc, Arc};
use std::thread;
use vnic_bridge::{Interface, InterfaceEvent, LoopbackHost};

mod utils;

fn main() -> Result<()> {
    utils::init_logging();
    let hint = std::env::args().nth(1);

    let host = Arc::new(LoopbackHost::default());
    let iface = Interface::new(host);
    let (events_tx, events_rx) = mpsc::channel::<InterfaceEvent>();

    let attributes = iface.open(hint.as_deref(), events_tx)?;
    println!(
        "opened {} mtu={} max_packet_size={} mac={}",
        attributes.identifier, attributes.mtu, attributes.max_packet_size, attributes.mac_address
    );

    // Ends once close drops the sink's sender.
    let printer = thread::spawn(move || {
        for event in events_rx {
            println!("event {:?}: ~{} packets available", event.kind, event.estimated_packets);
        }
    });

    let mut buf = vec![0u8; attributes.max_packet_size as usize];
    for round in 0..4u8 {
        let frame: Vec<u8> = (0..64).map(|i| i ^ round).collect();
        iface.write(&frame, 0)?;

        let result = iface.read(&mut buf)?;
        let echoed = &buf[..result.packet_size];
        println!(
            "round {}: wrote {} bytes, read {} bytes, match={}",
            round,
            frame.len(),
            result.packet_size,
            echoed == frame.as_slice()
        );
    }

    iface.close()?;
    drop(iface);
    let _ = printer.join();
    Ok(())
}
