//! Direct resolution of a *local* daemon's identity, independent of the
//! directory service.
//!
//! Daemons running on a machine publish two files into a runtime directory:
//! `<type>.ad`, their full self-ad in the binary ad encoding, and
//! `<type>.addr`, a plain-text fallback whose lines are the daemon's address,
//! logical name, full host name, and version. The probe prefers the self-ad
//! and synthesizes a minimal record from the address file otherwise.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use muster_proto::ad::{Ad, AttrValue, ATTR_ADDRESS, ATTR_MACHINE, ATTR_NAME, ATTR_VERSION};
use muster_proto::DaemonType;
use tracing::trace;

use crate::error::QueryError;

/// The environment variable overriding the runtime directory local daemons
/// publish their address and self-ad files in.
pub const RUN_DIR_ENV: &str = "MUSTER_RUN_DIR";

lazy_static! {
    /// Runtime directories probed, in order, when [`RUN_DIR_ENV`] is unset.
    static ref RUN_DIR_CANDIDATES: Vec<PathBuf> = vec![
        PathBuf::from("/var/run/muster"),
        PathBuf::from("/run/muster"),
        PathBuf::from("/tmp/muster"),
    ];
}

/// What a direct probe of a daemon can tell us about it.
///
/// `locate` establishes contact; the accessors report whatever the probe
/// could determine, each independently optional. The trait is the seam that
/// lets [`synthesize_ad`] be exercised without a running daemon.
pub trait DaemonProbe {
    /// Attempts to establish contact with the daemon. Returns false if the
    /// daemon cannot be found at all.
    fn locate(&mut self) -> bool;

    /// The daemon's self-published full ad, if it publishes one.
    fn daemon_ad(&self) -> Option<&Ad>;

    /// The daemon's network address.
    fn addr(&self) -> Option<&str>;

    /// The daemon's logical name.
    fn name(&self) -> Option<&str>;

    /// The full host name of the machine the daemon runs on.
    fn full_hostname(&self) -> Option<&str>;

    /// The daemon's version string.
    fn version(&self) -> Option<&str>;
}

/// A [`DaemonProbe`] backed by the local daemon runtime directory.
#[derive(Debug)]
pub struct LocalDaemon {
    daemon_type: DaemonType,
    run_dir: PathBuf,
    located: bool,
    ad: Option<Ad>,
    addr: Option<String>,
    name: Option<String>,
    hostname: Option<String>,
    version: Option<String>,
}

impl LocalDaemon {
    /// Creates a probe for the local daemon of the given type, using the
    /// configured runtime directory.
    pub fn new(daemon_type: DaemonType) -> Self {
        Self::with_run_dir(daemon_type, default_run_dir())
    }

    /// Creates a probe that reads runtime files from `run_dir` instead of
    /// the configured directory.
    pub fn with_run_dir(daemon_type: DaemonType, run_dir: impl Into<PathBuf>) -> Self {
        Self {
            daemon_type,
            run_dir: run_dir.into(),
            located: false,
            ad: None,
            addr: None,
            name: None,
            hostname: None,
            version: None,
        }
    }

    fn file_stem(&self) -> String {
        self.daemon_type.to_string().to_ascii_lowercase()
    }

    fn read_self_ad(&self, path: &Path) -> Option<Ad> {
        trace!(path = %path.display(), "trying self-ad file");
        let bytes = fs::read(path).ok()?;
        Ad::parse(&mut Cursor::new(bytes.as_slice())).ok()
    }

    fn read_addr_file(&mut self, path: &Path) -> bool {
        trace!(path = %path.display(), "trying address file");
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => return false,
        };
        let mut lines = contents.lines().map(str::trim);
        let mut next_field = || lines.next().filter(|l| !l.is_empty()).map(str::to_string);
        self.addr = next_field();
        self.name = next_field();
        self.hostname = next_field();
        self.version = next_field();
        true
    }
}

impl DaemonProbe for LocalDaemon {
    fn locate(&mut self) -> bool {
        if self.located {
            return true;
        }
        let stem = self.file_stem();

        let ad_path = self.run_dir.join(format!("{}.ad", stem));
        if let Some(ad) = self.read_self_ad(&ad_path) {
            self.ad = Some(ad);
            self.located = true;
            return true;
        }

        let addr_path = self.run_dir.join(format!("{}.addr", stem));
        if self.read_addr_file(&addr_path) {
            self.located = true;
            return true;
        }
        false
    }

    fn daemon_ad(&self) -> Option<&Ad> {
        self.ad.as_ref()
    }

    fn addr(&self) -> Option<&str> {
        self.addr.as_deref()
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn full_hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

/// Resolves a local daemon through `probe` into an ad.
///
/// The fallback is two-tiered: a self-published full ad is returned as a
/// copy verbatim; otherwise a minimal record is synthesized from the probe's
/// accessors. The address is mandatory and its absence aborts the whole
/// probe without a partial record; the logical name and host name fall back
/// to `"Unknown"` and the version to the empty string.
pub fn synthesize_ad(probe: &mut impl DaemonProbe) -> Result<Ad, QueryError> {
    if !probe.locate() {
        return Err(QueryError::LocalProbe(
            "Unable to locate local daemon.".to_string(),
        ));
    }

    if let Some(published) = probe.daemon_ad() {
        return Ok(published.clone());
    }

    let mut synthesized = Ad::new();

    let inserted = match probe.addr() {
        Some(addr) => synthesized.insert(ATTR_ADDRESS, AttrValue::from(addr)),
        None => false,
    };
    if !inserted {
        return Err(QueryError::LocalProbe(
            "Unable to locate daemon address.".to_string(),
        ));
    }

    let name = probe.name().unwrap_or("Unknown");
    if !synthesized.insert(ATTR_NAME, AttrValue::from(name)) {
        return Err(QueryError::LocalProbe(
            "Unable to insert daemon name.".to_string(),
        ));
    }

    let hostname = probe.full_hostname().unwrap_or("Unknown");
    if !synthesized.insert(ATTR_MACHINE, AttrValue::from(hostname)) {
        return Err(QueryError::LocalProbe(
            "Unable to insert daemon hostname.".to_string(),
        ));
    }

    let version = probe.version().unwrap_or("");
    if !synthesized.insert(ATTR_VERSION, AttrValue::from(version)) {
        return Err(QueryError::LocalProbe(
            "Unable to insert daemon version.".to_string(),
        ));
    }

    Ok(synthesized)
}

fn default_run_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(RUN_DIR_ENV) {
        return PathBuf::from(dir);
    }
    RUN_DIR_CANDIDATES
        .iter()
        .find(|dir| dir.is_dir())
        .unwrap_or(&RUN_DIR_CANDIDATES[0])
        .clone()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use muster_proto::ad::{Ad, AttrValue, ATTR_ADDRESS, ATTR_MACHINE, ATTR_NAME, ATTR_VERSION};
    use muster_proto::DaemonType;

    use crate::error::QueryError;

    use super::{synthesize_ad, DaemonProbe, LocalDaemon};

    struct StubProbe {
        reachable: bool,
        ad: Option<Ad>,
        addr: Option<&'static str>,
        name: Option<&'static str>,
        hostname: Option<&'static str>,
        version: Option<&'static str>,
    }

    impl StubProbe {
        fn reachable() -> Self {
            Self {
                reachable: true,
                ad: None,
                addr: Some("10.0.0.1:5525"),
                name: Some("startd@node1"),
                hostname: Some("node1.cluster.example"),
                version: Some("9.0.1"),
            }
        }
    }

    impl DaemonProbe for StubProbe {
        fn locate(&mut self) -> bool {
            self.reachable
        }
        fn daemon_ad(&self) -> Option<&Ad> {
            self.ad.as_ref()
        }
        fn addr(&self) -> Option<&str> {
            self.addr
        }
        fn name(&self) -> Option<&str> {
            self.name
        }
        fn full_hostname(&self) -> Option<&str> {
            self.hostname
        }
        fn version(&self) -> Option<&str> {
            self.version
        }
    }

    fn probe_err(probe: &mut impl DaemonProbe) -> String {
        match synthesize_ad(probe).unwrap_err() {
            QueryError::LocalProbe(msg) => msg,
            other => panic!("expected LocalProbe, got {:?}", other),
        }
    }

    #[test]
    fn published_self_ad_is_returned_verbatim() {
        let mut full_ad = Ad::new();
        assert!(full_ad.insert(ATTR_NAME, AttrValue::from("startd@node1")));
        assert!(full_ad.insert("CpusTotal", AttrValue::from(64_i64)));

        let mut probe = StubProbe::reachable();
        probe.ad = Some(full_ad.clone());

        assert_eq!(synthesize_ad(&mut probe).unwrap(), full_ad);
    }

    #[test]
    fn synthesized_ad_holds_exactly_the_four_probe_fields() {
        let mut probe = StubProbe::reachable();
        let ad = synthesize_ad(&mut probe).unwrap();

        assert_eq!(ad.len(), 4);
        assert_eq!(ad.get(ATTR_ADDRESS), Some(&AttrValue::from("10.0.0.1:5525")));
        assert_eq!(ad.get(ATTR_NAME), Some(&AttrValue::from("startd@node1")));
        assert_eq!(
            ad.get(ATTR_MACHINE),
            Some(&AttrValue::from("node1.cluster.example"))
        );
        assert_eq!(ad.get(ATTR_VERSION), Some(&AttrValue::from("9.0.1")));
    }

    #[test]
    fn missing_name_and_hostname_get_placeholders_and_version_goes_empty() {
        let mut probe = StubProbe::reachable();
        probe.name = None;
        probe.hostname = None;
        probe.version = None;

        let ad = synthesize_ad(&mut probe).unwrap();
        assert_eq!(ad.get(ATTR_NAME), Some(&AttrValue::from("Unknown")));
        assert_eq!(ad.get(ATTR_MACHINE), Some(&AttrValue::from("Unknown")));
        assert_eq!(ad.get(ATTR_VERSION), Some(&AttrValue::from("")));
    }

    #[test]
    fn missing_address_aborts_without_a_partial_record() {
        let mut probe = StubProbe::reachable();
        probe.addr = None;
        assert_eq!(probe_err(&mut probe), "Unable to locate daemon address.");
    }

    #[test]
    fn unreachable_daemon_is_its_own_failure() {
        let mut probe = StubProbe::reachable();
        probe.reachable = false;
        assert_eq!(probe_err(&mut probe), "Unable to locate local daemon.");
    }

    #[test]
    fn local_daemon_reads_the_address_file() {
        let dir = std::env::temp_dir().join(format!("muster-addr-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("master.addr"),
            "10.1.2.3:5525\nmaster@node1\nnode1.cluster.example\n",
        )
        .unwrap();

        let mut probe = LocalDaemon::with_run_dir(DaemonType::Master, &dir);
        let ad = synthesize_ad(&mut probe).unwrap();
        assert_eq!(ad.get(ATTR_ADDRESS), Some(&AttrValue::from("10.1.2.3:5525")));
        assert_eq!(ad.get(ATTR_NAME), Some(&AttrValue::from("master@node1")));
        // no version line published
        assert_eq!(ad.get(ATTR_VERSION), Some(&AttrValue::from("")));
    }

    #[test]
    fn local_daemon_prefers_the_published_self_ad() {
        let dir = std::env::temp_dir().join(format!("muster-ad-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let mut full_ad = Ad::new();
        assert!(full_ad.insert(ATTR_NAME, AttrValue::from("sched@node2")));
        assert!(full_ad.insert("TotalRunningJobs", AttrValue::from(12_i64)));
        fs::write(dir.join("schedule.ad"), full_ad.encode().unwrap()).unwrap();
        fs::write(dir.join("schedule.addr"), "ignored:0\n").unwrap();

        let mut probe = LocalDaemon::with_run_dir(DaemonType::Schedule, &dir);
        assert_eq!(synthesize_ad(&mut probe).unwrap(), full_ad);
    }

    #[test]
    fn missing_runtime_files_mean_unreachable() {
        let dir = std::env::temp_dir().join(format!("muster-empty-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let mut probe = LocalDaemon::with_run_dir(DaemonType::Negotiator, &dir);
        assert_eq!(probe_err(&mut probe), "Unable to locate local daemon.");
    }
}
