//! # lease-file
//!
//! Reads the DHCP lease table dnsmasq keeps on disk. The format is not
//! formally documented in the dnsmasq manual but has been described on the
//! mailing list:
//!
//! - <https://lists.thekelleys.org.uk/pipermail/dnsmasq-discuss/2006q2/000733.html>
//! - <https://lists.thekelleys.org.uk/pipermail/dnsmasq-discuss/2016q2/010595.html>
//!
//! The file is written by `lease_update_file()` in dnsmasq's `src/lease.c` and
//! read back by `lease_init()`. Each line holds one lease:
//!
//! ```text
//! <expiry epoch secs> <mac> <ip> <hostname> <client id>
//! ```
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::{
    borrow::Cow,
    io,
    num::ParseIntError,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};
use tracing::{debug, warn};

/// number of whitespace separated fields in a lease line
const LEASE_FIELDS: usize = 5;

/// An active DHCP lease
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// expiry time as seconds since the unix epoch, 0 for infinite leases
    pub expiry: u64,
    /// hardware address
    pub mac_address: String,
    /// leased address
    pub ip_address: String,
    /// client host name, `*` when unknown
    pub computer_name: String,
    /// client identifier, `*` when unknown
    pub client_id: String,
}

/// A single line that could not be parsed as a lease
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LeaseParseError {
    /// wrong number of fields
    #[error("illegal lease: expected {want} fields, got {got}")]
    FieldCount {
        /// fields found
        got: usize,
        /// fields expected
        want: usize,
    },
    /// expiry was not an unsigned integer
    #[error("illegal lease expiry: {0}")]
    Expiry(#[from] ParseIntError),
}

/// Failure to read the lease file as a whole
#[derive(Error, Debug)]
pub enum LeaseFileError {
    /// the file exists but could not be opened or read
    #[error("failed to read lease file {path}: {source}")]
    Io {
        /// lease file path
        path: PathBuf,
        /// underlying error
        #[source]
        source: io::Error,
    },
}

/// Parse one line of the lease file
pub fn parse_lease(line: &str) -> Result<Lease, LeaseParseError> {
    let fields = line.split_whitespace().collect::<Vec<_>>();
    let [expiry, mac, ip, name, client_id] = fields[..] else {
        return Err(LeaseParseError::FieldCount {
            got: fields.len(),
            want: LEASE_FIELDS,
        });
    };

    Ok(Lease {
        expiry: expiry.parse()?,
        mac_address: mac.to_owned(),
        ip_address: ip.to_owned(),
        computer_name: name.to_owned(),
        client_id: client_id.to_owned(),
    })
}

/// Read the lease file at `path`, returning its leases in file order.
///
/// A missing file means there are no leases. Lines that fail to parse are
/// logged and skipped, the rest of the file is still read.
pub async fn read_lease_file(path: impl AsRef<Path>) -> Result<Vec<Lease>, LeaseFileError> {
    let path = path.as_ref();
    let io_err = |source| LeaseFileError::Io {
        path: path.to_owned(),
        source,
    };

    let file = match File::open(path).await {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "lease file not found, no active leases");
            return Ok(Vec::new());
        }
        Err(err) => return Err(io_err(err)),
    };

    // lines are not guaranteed to be UTF-8
    let mut lines = BufReader::new(file).split(b'\n');
    let mut leases = Vec::new();
    let mut line_no = 0;
    while let Some(raw) = lines.next_segment().await.map_err(io_err)? {
        line_no += 1;
        let line = String::from_utf8_lossy(&raw);
        if let Cow::Owned(_) = line {
            debug!(line_no, "lease line is not valid UTF-8, decoded lossily");
        }
        match parse_lease(&line) {
            Ok(lease) => leases.push(lease),
            Err(err) => warn!(line_no, ?line, %err, "error parsing lease"),
        }
    }
    Ok(leases)
}
