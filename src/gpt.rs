//! Raw GPT partition-table reader.
//!
//! Reads the protective MBR and GPT header directly off a block device via
//! `BlockIO`, independent of whatever higher-level partition protocol the
//! firmware may or may not expose, and builds a map from partition-unique
//! GUID to a human-readable name so that discovered Linux kernels can be
//! offered a `root=PARTUUID=` choice.

use alloc::format;
use alloc::string::{String, ToString as _};
use alloc::vec::Vec;
use log::warn;
use uefi::boot::SearchType;
use uefi::proto::media::block::BlockIO;
use uefi::{Guid, Identify};

/// Signature `"EFI PART"`, little-endian, at offset 0 of the GPT header.
const EFI_SIGNATURE: u64 = 0x5452_4150_2049_4645;

/// MBR boot-sector signature at offset 510 of sector 0.
const MBR_SIGNATURE: u16 = 0xAA55;

/// Protective-MBR partition-record OS indicator marking a GPT-covered disk.
const MBR_OS_INDICATOR_GPT_PROTECTIVE: u8 = 0xEE;

/// Bytes read from LBA 0 covering the protective MBR, the GPT header, and
/// (for typical 512-byte-sector disks) the first several partition entries.
/// Rather than growing the read to `entry_count * entry_size`, this reader
/// caps at a single block-aligned read and logs when the entry array runs
/// past the buffer.
const READ_LEN: usize = 2048;

/// Maps a GPT partition-unique GUID to the label shown in the boot menu.
///
/// A small linear `Vec` rather than a binary tree or hash table: this crate
/// never needs to look up more than a few dozen partitions, and a GUID is
/// 16 bytes of opaque data with no ordering the map needs to care about.
#[derive(Default)]
pub struct GuidNameMap(Vec<(Guid, String)>);

impl GuidNameMap {
    fn new() -> Self {
        Self(Vec::new())
    }

    fn insert(&mut self, guid: Guid, name: String) {
        self.0.push((guid, name));
    }

    fn extend(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// Look up the name recorded for a partition-unique GUID, if any.
    pub fn get(&self, guid: &Guid) -> Option<&str> {
        self.0
            .iter()
            .find(|(g, _)| g == guid)
            .map(|(_, name)| name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Guid, &str)> {
        self.0.iter().map(|(g, n)| (g, n.as_str()))
    }
}

/// Walk every block-I/O-capable handle, parse the GPT on each, and fold the
/// partition-unique-GUID → name mapping of every disk into one table.
///
/// A handle that fails to open or read, or whose sector 0/1 don't look like
/// a GPT disk, is skipped without affecting any other handle.
pub fn find_roots() -> GuidNameMap {
    let mut roots = GuidNameMap::new();

    let handles = match uefi::boot::locate_handle_buffer(SearchType::ByProtocol(&BlockIO::GUID)) {
        Ok(handles) => handles,
        Err(e) => {
            warn!("locate_handle_buffer(BlockIO) failed: {e:?}");
            return roots;
        }
    };

    for handle in handles.iter() {
        let block_io = match uefi::boot::open_protocol_exclusive::<BlockIO>(*handle) {
            Ok(proto) => proto,
            Err(e) => {
                warn!("failed to open BlockIO on a handle: {e:?}");
                continue;
            }
        };

        if block_io.media().is_logical_partition() {
            // Partition-level handles don't carry their own GPT; only the
            // whole-disk handle does.
            continue;
        }

        match read_disk_roots(&block_io) {
            Ok(entries) => roots.extend(entries),
            Err(e) => warn!("skipping disk, not a readable GPT: {e}"),
        }
    }

    roots
}

fn read_disk_roots(block_io: &BlockIO) -> Result<GuidNameMap, String> {
    let media = block_io.media();
    let block_size = media.block_size().max(1);

    let mut buf = alloc::vec![0u8; READ_LEN];
    block_io
        .read_blocks(media.media_id(), 0, &mut buf)
        .map_err(|e| format!("read_blocks failed: {e:?}"))?;

    validate_protective_mbr(&buf)?;

    let header_offset = block_size as usize;
    if buf.len() < header_offset + 92 {
        return Err(String::from("buffer too small for GPT header"));
    }
    let header = GptHeader::parse(&buf[header_offset..])?;

    let mut roots = GuidNameMap::new();
    let entries_offset = (header.partition_entry_lba as usize) * (block_size as usize);
    for i in 0..header.entry_count as usize {
        let entry_offset = entries_offset + i * header.entry_size as usize;
        let entry_end = entry_offset + header.entry_size as usize;
        if entry_end > buf.len() {
            warn!(
                "GPT entry array extends past the {READ_LEN}-byte read at entry {i}; stopping early"
            );
            break;
        }

        let entry = match GptEntry::parse(&buf[entry_offset..entry_end]) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping malformed GPT entry {i}: {e}");
                continue;
            }
        };
        if entry.is_unused() {
            continue;
        }

        let name = if entry.name.is_empty() {
            size_label(entry.ending_lba, entry.starting_lba, block_size)
        } else {
            entry.name
        };
        roots.insert(entry.unique_guid, name);
    }

    Ok(roots)
}

fn validate_protective_mbr(buf: &[u8]) -> Result<(), String> {
    if buf.len() < 512 {
        return Err(String::from("buffer too small for MBR"));
    }
    let signature = u16::from_le_bytes([buf[510], buf[511]]);
    if signature != MBR_SIGNATURE {
        return Err(format!("bad MBR signature {signature:#06x}"));
    }
    // First partition record starts at offset 446; os_indicator is its
    // fifth byte.
    let os_indicator = buf[446 + 4];
    if os_indicator != MBR_OS_INDICATOR_GPT_PROTECTIVE {
        return Err(format!("not a protective MBR (indicator {os_indicator:#04x})"));
    }
    Ok(())
}

struct GptHeader {
    partition_entry_lba: u64,
    entry_count: u32,
    entry_size: u32,
}

impl GptHeader {
    fn parse(data: &[u8]) -> Result<Self, String> {
        let signature = u64::from_le_bytes(data[0..8].try_into().unwrap());
        if signature != EFI_SIGNATURE {
            return Err(format!("bad GPT signature {signature:#018x}"));
        }
        Ok(Self {
            partition_entry_lba: u64::from_le_bytes(data[72..80].try_into().unwrap()),
            entry_count: u32::from_le_bytes(data[80..84].try_into().unwrap()),
            entry_size: u32::from_le_bytes(data[84..88].try_into().unwrap()),
        })
    }
}

struct GptEntry {
    partition_type: Guid,
    unique_guid: Guid,
    starting_lba: u64,
    ending_lba: u64,
    name: String,
}

impl GptEntry {
    fn parse(data: &[u8]) -> Result<Self, String> {
        if data.len() < 128 {
            return Err(String::from("entry shorter than 128 bytes"));
        }
        let mut units = [0u16; 36];
        for (i, unit) in units.iter_mut().enumerate() {
            *unit = u16::from_le_bytes([data[56 + i * 2], data[56 + i * 2 + 1]]);
        }
        let end = units.iter().position(|&c| c == 0).unwrap_or(units.len());
        let name = String::from_utf16_lossy(&units[..end]);

        Ok(Self {
            partition_type: Guid::from_bytes(data[0..16].try_into().unwrap()),
            unique_guid: Guid::from_bytes(data[16..32].try_into().unwrap()),
            starting_lba: u64::from_le_bytes(data[32..40].try_into().unwrap()),
            ending_lba: u64::from_le_bytes(data[40..48].try_into().unwrap()),
            name,
        })
    }

    fn is_unused(&self) -> bool {
        self.partition_type == Guid::from_bytes([0; 16])
    }
}

/// Synthesize a fallback label like `"unknown 512MiB volume"` from a
/// partition's LBA span, used when the GPT entry's own name is empty.
fn size_label(ending_lba: u64, starting_lba: u64, block_size: u32) -> String {
    let Some(lba_span) = ending_lba.checked_sub(starting_lba) else {
        return String::from("unknown volume");
    };
    let Some(bytes) = lba_span
        .checked_add(1)
        .and_then(|span| span.checked_mul(block_size as u64))
    else {
        return String::from("unknown volume");
    };

    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    if bytes < MIB {
        format!("unknown {}KiB volume", (bytes / KIB).max(1))
    } else if bytes < GIB {
        format!("unknown {}MiB volume", bytes / MIB)
    } else {
        format!("unknown {}GiB volume", bytes / GIB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_guid_bytes() -> [u8; 16] {
        [0; 16]
    }

    #[test]
    fn gpt_header_rejects_bad_signature() {
        let mut buf = alloc::vec![0u8; 92];
        buf[0..8].copy_from_slice(&0u64.to_le_bytes());
        assert!(GptHeader::parse(&buf).is_err());
    }

    #[test]
    fn gpt_header_parses_offsets() {
        let mut buf = alloc::vec![0u8; 92];
        buf[0..8].copy_from_slice(&EFI_SIGNATURE.to_le_bytes());
        buf[72..80].copy_from_slice(&2u64.to_le_bytes());
        buf[80..84].copy_from_slice(&128u32.to_le_bytes());
        buf[84..88].copy_from_slice(&128u32.to_le_bytes());

        let header = GptHeader::parse(&buf).unwrap();
        assert_eq!(header.partition_entry_lba, 2);
        assert_eq!(header.entry_count, 128);
        assert_eq!(header.entry_size, 128);
    }

    #[test]
    fn unused_entry_is_recognized() {
        let buf = alloc::vec![0u8; 128];
        let entry = GptEntry::parse(&buf).unwrap();
        assert!(entry.is_unused());
        assert_eq!(entry.partition_type, Guid::from_bytes(zero_guid_bytes()));
    }

    #[test]
    fn entry_name_trims_at_first_nul() {
        let mut buf = alloc::vec![0u8; 128];
        // Give it a non-zero partition type so it isn't treated as unused.
        buf[0] = 1;
        let name: Vec<u16> = "root".encode_utf16().collect();
        for (i, unit) in name.iter().enumerate() {
            buf[56 + i * 2..56 + i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
        }
        let entry = GptEntry::parse(&buf).unwrap();
        assert_eq!(entry.name, "root");
    }

    #[test]
    fn size_label_picks_unit_by_magnitude() {
        assert_eq!(size_label(1, 0, 512), "unknown 1KiB volume");
        // (2047 - 0 + 1) * 512 bytes == exactly 1 MiB.
        assert_eq!(size_label(2047, 0, 512), "unknown 1MiB volume");
    }

    #[test]
    fn size_label_saturates_on_overflow() {
        assert_eq!(size_label(0, 1, 512), "unknown volume");
    }

    #[test]
    fn validate_protective_mbr_rejects_missing_signature() {
        let buf = alloc::vec![0u8; 512];
        assert!(validate_protective_mbr(&buf).is_err());
    }

    #[test]
    fn validate_protective_mbr_accepts_ee_indicator() {
        let mut buf = alloc::vec![0u8; 512];
        buf[446 + 4] = 0xEE;
        buf[510] = 0x55;
        buf[511] = 0xAA;
        assert!(validate_protective_mbr(&buf).is_ok());
    }

    #[test]
    fn guid_name_map_looks_up_by_value() {
        let guid = Guid::from_bytes([1; 16]);
        let mut map = GuidNameMap::new();
        map.insert(guid, String::from("root"));
        assert_eq!(map.get(&guid), Some("root"));
        assert_eq!(map.get(&Guid::from_bytes([2; 16])), None);
    }

    #[test]
    fn guid_name_map_extend_merges_entries() {
        let mut a = GuidNameMap::new();
        a.insert(Guid::from_bytes([1; 16]), String::from("a"));
        let mut b = GuidNameMap::new();
        b.insert(Guid::from_bytes([2; 16]), String::from("b"));
        a.extend(b);
        assert_eq!(a.iter().count(), 2);
    }
}
