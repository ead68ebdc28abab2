//! Environment, port and start-script payload for new instances.
//!
//! The image's portal, dashboard, notebook and file-sync services are exposed
//! over fixed TCP ports, and a contiguous UDP range starting at
//! [`MOSH_UDP_BASE_PORT`] is reserved for `mosh-server`.

/// First UDP port opened for Mosh sessions.
pub const MOSH_UDP_BASE_PORT: u16 = 60001;

/// Upper bound on the number of UDP ports a launch may request.
pub const MAX_UDP_PORTS: u16 = 16;

/// Instance portal port.
pub const PORTAL_PORT: u16 = 1111;
/// Tensorboard dashboard port.
pub const DASHBOARD_PORT: u16 = 6006;
/// Jupyter notebook port.
pub const NOTEBOOK_PORT: u16 = 8080;
/// Syncthing file-sync port.
pub const SYNC_PORT: u16 = 8384;

const PORTAL_CONFIG: &str = concat!(
    "localhost:1111:11111:/:Instance Portal|",
    "localhost:8080:18080:/:Jupyter|",
    "localhost:8080:8080:/terminals/1:Jupyter Terminal|",
    "localhost:8384:18384:/:Syncthing|",
    "localhost:6006:16006:/:Tensorboard"
);

/// Script executed by the instance on first boot before the image entrypoint.
pub const ONSTART_SCRIPT: &str = concat!(
    "echo 'Updating apt...'; apt-get update; ",
    "echo 'Installing mosh and locales...'; apt-get install -y mosh locales; ",
    "echo 'Generating en_US.UTF-8 locale...'; locale-gen en_US.UTF-8; ",
    "update-locale LANG=en_US.UTF-8; export LANG=en_US.UTF-8; export LC_ALL=en_US.UTF-8; ",
    "echo 'Setup complete. Starting image entrypoint...'; exec entrypoint.sh"
);

/// Transport protocol of a forwarded port.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Protocol {
    /// TCP (the CLI default, rendered without suffix).
    Tcp,
    /// UDP, rendered with a `/udp` suffix.
    Udp,
}

/// A container port exposed on the host.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PortForward {
    /// Port inside the container (mirrored on the host side).
    pub port: u16,
    /// Transport protocol.
    pub protocol: Protocol,
}

impl PortForward {
    /// TCP forward.
    #[must_use]
    pub const fn tcp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Tcp,
        }
    }

    /// UDP forward.
    #[must_use]
    pub const fn udp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Udp,
        }
    }

    fn render(self) -> String {
        match self.protocol {
            Protocol::Tcp => format!("-p {port}:{port}", port = self.port),
            Protocol::Udp => format!("-p {port}:{port}/udp", port = self.port),
        }
    }
}

/// Environment variables and ports passed through `--env`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EnvironmentManifest {
    /// Variables exported inside the container, in order.
    pub variables: Vec<(String, String)>,
    /// Ports exposed on the host, in order.
    pub ports: Vec<PortForward>,
}

impl EnvironmentManifest {
    /// Builds the standard manifest with `udp_ports` Mosh ports.
    ///
    /// `udp_ports` is clamped to `1..=MAX_UDP_PORTS`.
    #[must_use]
    pub fn standard(udp_ports: u16) -> Self {
        let variables = [
            ("OPEN_BUTTON_PORT", "1111"),
            ("OPEN_BUTTON_TOKEN", "1"),
            ("JUPYTER_DIR", "/"),
            ("DATA_DIRECTORY", "/workspace/"),
            ("PORTAL_CONFIG", PORTAL_CONFIG),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect();

        let mut ports = vec![
            PortForward::tcp(PORTAL_PORT),
            PortForward::tcp(DASHBOARD_PORT),
            PortForward::tcp(NOTEBOOK_PORT),
            PortForward::tcp(SYNC_PORT),
        ];
        let count = udp_ports.clamp(1, MAX_UDP_PORTS);
        ports.extend((0..count).map(|offset| PortForward::udp(MOSH_UDP_BASE_PORT + offset)));

        Self { variables, ports }
    }

    /// Renders the `--env` block understood by `vastai create instance`.
    #[must_use]
    pub fn render(&self) -> String {
        self.variables
            .iter()
            .map(|(key, value)| format!("-e {key}={value}"))
            .chain(self.ports.iter().map(|port| port.render()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn standard_manifest_exposes_services_and_one_udp_port() {
        let rendered = EnvironmentManifest::standard(1).render();

        assert!(rendered.starts_with("-e OPEN_BUTTON_PORT=1111 -e OPEN_BUTTON_TOKEN=1"));
        assert!(rendered.contains("-e DATA_DIRECTORY=/workspace/"));
        assert!(rendered.ends_with(
            "-p 1111:1111 -p 6006:6006 -p 8080:8080 -p 8384:8384 -p 60001:60001/udp"
        ));
    }

    #[rstest]
    #[case(0, 1)]
    #[case(3, 3)]
    #[case(200, usize::from(MAX_UDP_PORTS))]
    fn udp_port_count_is_clamped(#[case] requested: u16, #[case] expected: usize) {
        let manifest = EnvironmentManifest::standard(requested);
        let udp = manifest
            .ports
            .iter()
            .filter(|port| port.protocol == Protocol::Udp)
            .collect::<Vec<_>>();

        assert_eq!(udp.len(), expected);
        assert_eq!(udp.first().map(|port| port.port), Some(MOSH_UDP_BASE_PORT));
    }

    #[rstest]
    fn onstart_script_installs_mosh_and_execs_entrypoint() {
        assert!(ONSTART_SCRIPT.contains("apt-get install -y mosh"));
        assert!(ONSTART_SCRIPT.contains("locale-gen en_US.UTF-8"));
        assert!(ONSTART_SCRIPT.ends_with("exec entrypoint.sh"));
    }
}
