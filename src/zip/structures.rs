use byteorder::{LittleEndian, WriteBytesExt};
use chrono::{DateTime, Datelike, Local, Timelike};
use std::io::{self, Write};
use std::time::SystemTime;

/// Version needed to extract: 2.0 (DEFLATE)
pub const VERSION_NEEDED: u16 = 20;

/// General purpose flag bit 11: file name is UTF-8
pub const FLAG_UTF8: u16 = 1 << 11;

/// DEFLATE compression method
pub const METHOD_DEFLATE: u16 = 8;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: u32 = 0x0403_4b50;
pub const LFH_SIZE: usize = 30;

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: u32 = 0x0201_4b50;
pub const CDFH_MIN_SIZE: usize = 46;

/// Most entries a classic (non-ZIP64) archive can record
pub const MAX_ENTRIES: usize = u16::MAX as usize;

/// MS-DOS timestamp as stored in ZIP headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosDateTime {
    pub time: u16,
    pub date: u16,
}

impl DosDateTime {
    /// 1980-01-01 00:00:00, the earliest representable instant
    pub const EPOCH: Self = Self {
        time: 0,
        date: (1 << 5) | 1,
    };

    /// Encode a local wall-clock time. Years outside 1980..=2107 clamp to
    /// the nearest representable bound.
    pub fn from_system_time(time: SystemTime) -> Self {
        let local: DateTime<Local> = time.into();
        if local.year() < 1980 {
            return Self::EPOCH;
        }
        let year = local.year().min(2107) as u16;

        Self {
            time: ((local.hour() as u16) << 11)
                | ((local.minute() as u16) << 5)
                | (local.second() as u16 / 2),
            date: ((year - 1980) << 9) | ((local.month() as u16) << 5) | local.day() as u16,
        }
    }

    /// Decode to (year, month, day)
    pub fn date_parts(&self) -> (u16, u8, u8) {
        let day = (self.date & 0x1F) as u8;
        let month = ((self.date >> 5) & 0x0F) as u8;
        let year = ((self.date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Decode to (hour, minute, second)
    pub fn time_parts(&self) -> (u8, u8, u8) {
        let second = ((self.time & 0x1F) * 2) as u8;
        let minute = ((self.time >> 5) & 0x3F) as u8;
        let hour = ((self.time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }
}

/// One archive member, as recorded in both its local header and the
/// central directory
#[derive(Debug, Clone)]
pub struct ZipFileEntry {
    /// Name bytes as stored; UTF-8 unless the source name was not
    pub file_name: Vec<u8>,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub lfh_offset: u32,
    pub modified: DosDateTime,
}

impl ZipFileEntry {
    /// General purpose flags: bit 11 only when the name is valid UTF-8
    pub fn flags(&self) -> u16 {
        if std::str::from_utf8(&self.file_name).is_ok() {
            FLAG_UTF8
        } else {
            0
        }
    }

    /// Write the local file header, followed by the name
    pub fn write_local_header<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(LFH_SIGNATURE)?;
        w.write_u16::<LittleEndian>(VERSION_NEEDED)?;
        w.write_u16::<LittleEndian>(self.flags())?;
        w.write_u16::<LittleEndian>(METHOD_DEFLATE)?;
        w.write_u16::<LittleEndian>(self.modified.time)?;
        w.write_u16::<LittleEndian>(self.modified.date)?;
        w.write_u32::<LittleEndian>(self.crc32)?;
        w.write_u32::<LittleEndian>(self.compressed_size)?;
        w.write_u32::<LittleEndian>(self.uncompressed_size)?;
        w.write_u16::<LittleEndian>(self.file_name.len() as u16)?;
        w.write_u16::<LittleEndian>(0)?; // extra field length
        w.write_all(&self.file_name)
    }

    /// Write the central directory record, followed by the name
    pub fn write_central_header<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(CDFH_SIGNATURE)?;
        w.write_u16::<LittleEndian>(VERSION_NEEDED)?; // version made by: MS-DOS, 2.0
        w.write_u16::<LittleEndian>(VERSION_NEEDED)?;
        w.write_u16::<LittleEndian>(self.flags())?;
        w.write_u16::<LittleEndian>(METHOD_DEFLATE)?;
        w.write_u16::<LittleEndian>(self.modified.time)?;
        w.write_u16::<LittleEndian>(self.modified.date)?;
        w.write_u32::<LittleEndian>(self.crc32)?;
        w.write_u32::<LittleEndian>(self.compressed_size)?;
        w.write_u32::<LittleEndian>(self.uncompressed_size)?;
        w.write_u16::<LittleEndian>(self.file_name.len() as u16)?;
        w.write_u16::<LittleEndian>(0)?; // extra field length
        w.write_u16::<LittleEndian>(0)?; // file comment length
        w.write_u16::<LittleEndian>(0)?; // disk number start
        w.write_u16::<LittleEndian>(0)?; // internal attributes
        w.write_u32::<LittleEndian>(0)?; // external attributes
        w.write_u32::<LittleEndian>(self.lfh_offset)?;
        w.write_all(&self.file_name)
    }
}

/// End of Central Directory (EOCD) - 22 bytes, no comment
pub struct EndOfCentralDirectory {
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: u32 = 0x0605_4b50;
    pub const SIZE: usize = 22;

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(Self::SIGNATURE)?;
        w.write_u16::<LittleEndian>(0)?; // this disk
        w.write_u16::<LittleEndian>(0)?; // disk with central directory
        w.write_u16::<LittleEndian>(self.total_entries)?;
        w.write_u16::<LittleEndian>(self.total_entries)?;
        w.write_u32::<LittleEndian>(self.cd_size)?;
        w.write_u32::<LittleEndian>(self.cd_offset)?;
        w.write_u16::<LittleEndian>(0) // comment length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn dos_time_round_trips_to_two_second_precision() {
        let local = Local.with_ymd_and_hms(2024, 5, 17, 13, 45, 31).unwrap();
        let dos = DosDateTime::from_system_time(local.into());
        assert_eq!(dos.date_parts(), (2024, 5, 17));
        assert_eq!(dos.time_parts(), (13, 45, 30));
    }

    #[test]
    fn dos_time_clamps_before_1980() {
        let dos = DosDateTime::from_system_time(SystemTime::UNIX_EPOCH);
        // UNIX_EPOCH is 1969 or 1970 locally; both predate the DOS epoch
        assert_eq!(dos, DosDateTime::EPOCH);
        assert_eq!(dos.date_parts(), (1980, 1, 1));
    }

    #[test]
    fn header_sizes_match_the_format() {
        let entry = ZipFileEntry {
            file_name: b"pages/a.js".to_vec(),
            crc32: 1,
            compressed_size: 2,
            uncompressed_size: 3,
            lfh_offset: 4,
            modified: DosDateTime::EPOCH,
        };
        let mut local = Vec::new();
        entry.write_local_header(&mut local).unwrap();
        assert_eq!(local.len(), LFH_SIZE + 10);
        assert_eq!(&local[..4], b"PK\x03\x04");

        let mut central = Vec::new();
        entry.write_central_header(&mut central).unwrap();
        assert_eq!(central.len(), CDFH_MIN_SIZE + 10);
        assert_eq!(&central[..4], b"PK\x01\x02");

        let mut eocd = Vec::new();
        EndOfCentralDirectory {
            total_entries: 1,
            cd_size: central.len() as u32,
            cd_offset: local.len() as u32,
        }
        .write_to(&mut eocd)
        .unwrap();
        assert_eq!(eocd.len(), EndOfCentralDirectory::SIZE);
        assert_eq!(&eocd[..4], b"PK\x05\x06");
    }

    #[test]
    fn utf8_flag_only_for_utf8_names() {
        let mut entry = ZipFileEntry {
            file_name: "pages/首页.js".as_bytes().to_vec(),
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            lfh_offset: 0,
            modified: DosDateTime::EPOCH,
        };
        assert_eq!(entry.flags(), FLAG_UTF8);

        entry.file_name = b"\xD6\xD0.png".to_vec();
        assert_eq!(entry.flags(), 0);
        let mut local = Vec::new();
        entry.write_local_header(&mut local).unwrap();
        assert_eq!(&local[6..8], &[0, 0]);
        assert_eq!(&local[LFH_SIZE..], b"\xD6\xD0.png");
    }
}
