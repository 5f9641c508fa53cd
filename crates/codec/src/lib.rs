//! # Codec — Raft Entry Envelope & Replicated Command Format
//!
//! Every Raft entry's `data` field in HarborKV is a framed envelope:
//!
//! ```text
//! [version_tag: u8][command_id: 8 bytes][command bytes ...]
//! ```
//!
//! The version tag distinguishes ordinary commands from **sideloaded** ones
//! (commands whose bulk-ingest payload is stored outside the Raft log).
//! Detecting a sideloaded entry only requires looking at the first byte —
//! [`sniff_sideloaded`] — so hot paths never decode entries they don't care
//! about. The numeric tag values are written to disk and must never change.
//!
//! ## Replicated Command Format
//!
//! The command bytes are a [`ReplicatedCommand`] in a little-endian binary
//! layout:
//!
//! ```text
//! [max_lease_index: u64][flags: u8]
//! if flags & FLAG_INGEST:
//!     [crc32: u32][data_len: u32][data bytes ...]
//! [write_batch_len: u32][write_batch bytes ...]
//! ```
//!
//! The optional ingest sub-message carries the bulk SSTable payload. The
//! "thin" form of a command (payload stripped for sideloading) is identical
//! to the "fat" form except that `ingest.data` is empty — so splicing the
//! payload back in reproduces the original bytes exactly.
//!
//! ## Example
//!
//! ```rust
//! use codec::{encode_raft_command, decode_raft_command, sniff_sideloaded};
//! use codec::{CommandId, EntryVersion, IngestSst, ReplicatedCommand};
//!
//! let mut cmd = ReplicatedCommand::default();
//! cmd.ingest = Some(IngestSst::new(b"bulk bytes".to_vec()));
//!
//! let id = CommandId::from_bytes(*b"cmd-0001");
//! let data = encode_raft_command(EntryVersion::Sideloaded, id, &cmd.marshal().unwrap());
//! assert!(sniff_sideloaded(&data));
//!
//! let (got_id, cmd_bytes) = decode_raft_command(&data).unwrap();
//! assert_eq!(got_id, id);
//! assert_eq!(ReplicatedCommand::unmarshal(cmd_bytes).unwrap(), cmd);
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io;

use thiserror::Error;

/// Fixed width of the command id window in the envelope.
pub const COMMAND_ID_LEN: usize = 8;

/// Envelope version tag for ordinary commands. Stable on-disk value.
const VERSION_TAG_STANDARD: u8 = 0x00;
/// Envelope version tag for sideloaded commands. Stable on-disk value.
const VERSION_TAG_SIDELOADED: u8 = 0x01;

/// Flag bit in the command encoding marking an ingest sub-message.
const FLAG_INGEST: u8 = 0b0000_0001;

/// Errors from envelope or command decoding. Both indicate corruption (or a
/// version from the future) and are fatal for the Raft append path.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The envelope is shorter than its fixed prefix.
    #[error("envelope too short: {0} bytes")]
    EnvelopeTooShort(usize),

    /// The version tag is not one we know how to decode.
    #[error("unknown envelope version tag {0:#04x}")]
    UnknownVersion(u8),

    /// The command bytes failed structural validation.
    #[error("corrupt command encoding")]
    Corrupt,

    /// An underlying read error (short buffer).
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Opaque fixed-width identifier correlating a Raft entry with its proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandId([u8; COMMAND_ID_LEN]);

impl CommandId {
    pub fn from_bytes(bytes: [u8; COMMAND_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; COMMAND_ID_LEN] {
        &self.0
    }
}

/// The envelope version: which encoding wraps the command bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryVersion {
    /// Ordinary command; never sideloaded, even if it carries an ingest.
    Standard,
    /// Command whose ingest payload lives in the sideload storage while the
    /// entry sits in the Raft log.
    Sideloaded,
}

impl EntryVersion {
    fn tag(self) -> u8 {
        match self {
            EntryVersion::Standard => VERSION_TAG_STANDARD,
            EntryVersion::Sideloaded => VERSION_TAG_SIDELOADED,
        }
    }
}

/// One Raft log record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RaftEntry {
    pub index: u64,
    pub term: u64,
    /// Framed envelope; see the crate docs for the layout.
    pub data: Vec<u8>,
}

impl RaftEntry {
    pub fn new(index: u64, term: u64, data: Vec<u8>) -> Self {
        Self { index, term, data }
    }

    /// Accounting size of this entry: index + term + payload bytes. Used for
    /// cache budgets and Raft log size tracking.
    pub fn size(&self) -> usize {
        8 + 8 + self.data.len()
    }
}

/// Encodes the envelope: version tag, fixed-width command id, command bytes.
pub fn encode_raft_command(version: EntryVersion, id: CommandId, command: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(1 + COMMAND_ID_LEN + command.len());
    data.push(version.tag());
    data.extend_from_slice(id.as_bytes());
    data.extend_from_slice(command);
    data
}

/// Inverse of [`encode_raft_command`]: splits the envelope into the command
/// id and the (borrowed) command bytes.
pub fn decode_raft_command(data: &[u8]) -> Result<(CommandId, &[u8]), CodecError> {
    if data.len() < 1 + COMMAND_ID_LEN {
        return Err(CodecError::EnvelopeTooShort(data.len()));
    }
    match data[0] {
        VERSION_TAG_STANDARD | VERSION_TAG_SIDELOADED => {}
        other => return Err(CodecError::UnknownVersion(other)),
    }
    let mut id = [0u8; COMMAND_ID_LEN];
    id.copy_from_slice(&data[1..1 + COMMAND_ID_LEN]);
    Ok((CommandId(id), &data[1 + COMMAND_ID_LEN..]))
}

/// Cheap O(1) check for the sideloaded encoding. Inspects only the version
/// tag; never copies or decodes.
pub fn sniff_sideloaded(data: &[u8]) -> bool {
    matches!(data.first(), Some(&VERSION_TAG_SIDELOADED))
}

/// The bulk-ingest sub-message of a replicated command: an SSTable to be
/// ingested into the storage engine, plus a checksum over its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IngestSst {
    /// The SSTable bytes. Empty in the "thin" (sideloaded) form.
    pub data: Vec<u8>,
    /// CRC32 over the original payload. Survives stripping so the ingest
    /// handler can verify the payload it reads back from sideload storage.
    pub crc32: u32,
}

impl IngestSst {
    /// Builds the sub-message, computing the checksum over `data`.
    pub fn new(data: Vec<u8>) -> Self {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&data);
        let crc32 = hasher.finalize();
        Self { data, crc32 }
    }
}

/// A replicated state-machine command as carried by a Raft entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplicatedCommand {
    /// Lease sequencing token assigned at proposal time.
    pub max_lease_index: u64,
    /// Optional bulk-ingest sub-message; the sideloadable part.
    pub ingest: Option<IngestSst>,
    /// Serialized engine write batch for ordinary mutations.
    pub write_batch: Vec<u8>,
}

impl ReplicatedCommand {
    /// Serializes the command into the deterministic little-endian layout
    /// described in the crate docs.
    pub fn marshal(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(
            8 + 1
                + self.ingest.as_ref().map_or(0, |i| 8 + i.data.len())
                + 4
                + self.write_batch.len(),
        );
        buf.write_u64::<LittleEndian>(self.max_lease_index)?;
        match &self.ingest {
            Some(ingest) => {
                buf.write_u8(FLAG_INGEST)?;
                buf.write_u32::<LittleEndian>(ingest.crc32)?;
                buf.write_u32::<LittleEndian>(ingest.data.len() as u32)?;
                buf.extend_from_slice(&ingest.data);
            }
            None => buf.write_u8(0)?,
        }
        buf.write_u32::<LittleEndian>(self.write_batch.len() as u32)?;
        buf.extend_from_slice(&self.write_batch);
        Ok(buf)
    }

    /// Inverse of [`marshal`](ReplicatedCommand::marshal).
    ///
    /// Rejects trailing garbage and any length field pointing past the end
    /// of the buffer.
    pub fn unmarshal(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut rdr = bytes;
        let max_lease_index = rdr.read_u64::<LittleEndian>()?;
        let flags = rdr.read_u8()?;
        if flags & !FLAG_INGEST != 0 {
            return Err(CodecError::Corrupt);
        }

        let ingest = if flags & FLAG_INGEST != 0 {
            let crc32 = rdr.read_u32::<LittleEndian>()?;
            let data_len = rdr.read_u32::<LittleEndian>()? as usize;
            if data_len > rdr.len() {
                return Err(CodecError::Corrupt);
            }
            let (data, rest) = rdr.split_at(data_len);
            rdr = rest;
            Some(IngestSst {
                data: data.to_vec(),
                crc32,
            })
        } else {
            None
        };

        let wb_len = rdr.read_u32::<LittleEndian>()? as usize;
        if wb_len > rdr.len() {
            return Err(CodecError::Corrupt);
        }
        let (write_batch, rest) = rdr.split_at(wb_len);
        if !rest.is_empty() {
            return Err(CodecError::Corrupt);
        }

        Ok(Self {
            max_lease_index,
            ingest,
            write_batch: write_batch.to_vec(),
        })
    }
}
