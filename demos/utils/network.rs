use std::io;
use std::process::Command;

/// Assign `ip_cidr` to `iface_name` and bring the link up
///
/// Shells out to `ip`; requires root or CAP_NET_ADMIN.
#[allow(dead_code)]
pub fn configure_interface(iface_name: &str, ip_cidr: &str) -> io::Result<()> {
    run_ip(&["addr", "add", ip_cidr, "dev", iface_name])?;
    run_ip(&["link", "set", "up", "dev", iface_name])?;

    tracing::info!(iface = iface_name, ip = ip_cidr, "interface configured and up");
    Ok(())
}

fn run_ip(args: &[&str]) -> io::Result<()> {
    let status = Command::new("ip").args(args).status()?;
    if !status.success() {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("`ip {}` exited with {}", args.join(" "), status),
        ));
    }
    Ok(())
}

/// Install a fmt subscriber honouring `RUST_LOG`-style level names
pub fn init_logging() {
    let level = std::env::var("VNIC_LOG")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();
}
