/// Plain-struct configuration for a single participant process. Built from
/// explicit fields rather than implicit global state, following the
/// configuration-struct idiom used throughout the retrieved pack (e.g. a
/// datastore's `MetastoreConfig`) and the teacher's own env-var-driven
/// binary in `rhc/src/bin/lis-mds.rs`.
#[derive(Debug, Clone)]
pub struct StateMachineConfig {
    /// Number of applied-but-unpersisted entries tolerated before
    /// `StateCore::flush` writes a dump. The spec's "constant, e.g. 1000"
    /// production default, exposed here so tests can exercise the
    /// threshold with small values.
    pub flush_batch_size: u64,

    /// Address the HTTP forwarding surface binds to.
    pub bind_addr: std::net::SocketAddr,

    /// Address of this participant's own peer endpoint, as advertised to
    /// the rest of the cluster for forwarding.
    pub advertise_addr: std::net::SocketAddr,
}

impl StateMachineConfig {
    pub fn new(bind_addr: std::net::SocketAddr) -> Self {
        Self {
            flush_batch_size: 1000,
            bind_addr,
            advertise_addr: bind_addr,
        }
    }
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        Self::new("127.0.0.1:8529".parse().expect("valid default bind address"))
    }
}
