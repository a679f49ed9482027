use der::asn1::UtcTime;
use der::Sequence;
use tuf_trust_common::Version;

use crate::snapshot::MetaFile;
use crate::SpecVersion;

/// DER encoding of the TUF Timestamp format.
/// [Refer to the TUF specification.](https://theupdateframework.github.io/specification/latest/#file-formats-timestamp)
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct Timestamp {
    pub expires: UtcTime,
    /// Pins the current snapshot.
    pub meta: MetaFile,
    pub spec_version: SpecVersion,
    pub version: Version,
}
