// NowLink - Sensor telemetry link
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Persisted channel cache
//!
//! The cached channel lives in a few bytes of non-volatile memory so a node
//! can skip the slow network scan on every wake. Layout:
//!
//! ```text
//! offset 0  channel (1-14, anything else means unset)
//! offset 1  layout version
//! offset 2  CRC-8 over bytes 0..2
//! ```
//!
//! Offset 0 keeps the single-byte format older firmware wrote; an image
//! without a valid version and checksum reads as unset and is rescanned once.

use crate::channel::WifiChannel;
use crate::error::StorageError;
use crc::{Crc, CRC_8_SMBUS};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Layout version tag stored next to the channel
pub const LAYOUT_VERSION: u8 = 1;

/// Bytes occupied by the cache record
pub const CACHE_RECORD_SIZE: usize = 3;

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Byte-addressable non-volatile memory (EEPROM, flash page, file)
pub trait NvMemory {
    /// Read `buf.len()` bytes starting at `offset`
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Stage `data` at `offset`; visible to reads, durable after `commit`
    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError>;

    /// Flush staged writes to the medium
    fn commit(&mut self) -> Result<(), StorageError>;
}

/// Typed storage for the last known radio channel
pub trait ChannelStore {
    /// Load the cached channel, `None` when unset or invalid
    fn load(&mut self) -> Option<WifiChannel>;

    /// Persist a channel. Returns `Ok(false)` when the cached value already
    /// matches and nothing was written.
    fn store(&mut self, channel: WifiChannel) -> Result<bool, StorageError>;
}

/// Channel cache on top of any [`NvMemory`]
#[derive(Debug)]
pub struct ChannelCache<M> {
    memory: M,
    writes: u32,
}

impl<M: NvMemory> ChannelCache<M> {
    /// Wrap a memory
    pub fn new(memory: M) -> Self {
        Self { memory, writes: 0 }
    }

    /// Number of committed writes made through this cache
    pub fn writes(&self) -> u32 {
        self.writes
    }

    /// Borrow the underlying memory
    pub fn memory(&self) -> &M {
        &self.memory
    }

    fn encode(channel: WifiChannel) -> [u8; CACHE_RECORD_SIZE] {
        let head = [channel.get(), LAYOUT_VERSION];
        [head[0], head[1], CRC8.checksum(&head)]
    }

    fn read_record(&mut self) -> Result<Option<WifiChannel>, StorageError> {
        let mut raw = [0u8; CACHE_RECORD_SIZE];
        self.memory.read(0, &mut raw)?;
        if raw[1] != LAYOUT_VERSION || CRC8.checksum(&raw[..2]) != raw[2] {
            return Ok(None);
        }
        Ok(WifiChannel::new(raw[0]))
    }
}

impl<M: NvMemory> ChannelStore for ChannelCache<M> {
    fn load(&mut self) -> Option<WifiChannel> {
        match self.read_record() {
            Ok(channel) => channel,
            Err(e) => {
                log::warn!("failed to read channel cache: {}", e);
                None
            }
        }
    }

    fn store(&mut self, channel: WifiChannel) -> Result<bool, StorageError> {
        if self.read_record()? == Some(channel) {
            return Ok(false);
        }

        self.memory.write(0, &Self::encode(channel))?;
        self.memory.commit()?;
        self.writes += 1;

        if self.read_record()? != Some(channel) {
            return Err(StorageError::VerifyFailed);
        }
        log::info!("channel {} written to cache", channel);
        Ok(true)
    }
}

/// RAM-backed memory, starts erased (all `0xFF`)
#[derive(Debug, Clone)]
pub struct MemoryNv {
    bytes: Vec<u8>,
    commits: u32,
}

impl MemoryNv {
    /// Create an erased memory of `size` bytes
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0xFF; size],
            commits: 0,
        }
    }

    /// Create a memory with existing contents
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes, commits: 0 }
    }

    /// Raw contents
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of commits performed
    pub fn commits(&self) -> u32 {
        self.commits
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<(), StorageError> {
        if offset + len > self.bytes.len() {
            return Err(StorageError::Io(format!(
                "range {}..{} outside {} bytes",
                offset,
                offset + len,
                self.bytes.len()
            )));
        }
        Ok(())
    }
}

impl NvMemory for MemoryNv {
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        self.check_range(offset, buf.len())?;
        buf.copy_from_slice(&self.bytes[offset..offset + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        self.check_range(offset, data.len())?;
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        self.commits += 1;
        Ok(())
    }
}

/// File-backed memory for hosts and simulators
#[derive(Debug)]
pub struct FileNv {
    path: PathBuf,
    file: File,
}

impl FileNv {
    /// Open or create the backing file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(Self { path, file })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NvMemory for FileNv {
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        let io = |e: std::io::Error| StorageError::Io(e.to_string());
        let len = self.file.metadata().map_err(io)?.len() as usize;
        // Bytes past the end of the file read as erased
        buf.fill(0xFF);
        if offset >= len {
            return Ok(());
        }
        let available = (len - offset).min(buf.len());
        self.file.seek(SeekFrom::Start(offset as u64)).map_err(io)?;
        self.file.read_exact(&mut buf[..available]).map_err(io)?;
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        let io = |e: std::io::Error| StorageError::Io(e.to_string());
        self.file.seek(SeekFrom::Start(offset as u64)).map_err(io)?;
        self.file.write_all(data).map_err(io)
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        self.file
            .sync_all()
            .map_err(|e| StorageError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(n: u8) -> WifiChannel {
        WifiChannel::new(n).unwrap()
    }

    #[test]
    fn test_erased_memory_reads_unset() {
        let mut cache = ChannelCache::new(MemoryNv::new(16));
        assert_eq!(cache.load(), None);
    }

    #[test]
    fn test_store_then_load() {
        let mut cache = ChannelCache::new(MemoryNv::new(16));
        assert_eq!(cache.store(ch(6)), Ok(true));
        assert_eq!(cache.load(), Some(ch(6)));
        assert_eq!(cache.memory().bytes()[0], 6);
    }

    #[test]
    fn test_store_same_channel_skips_write() {
        let mut cache = ChannelCache::new(MemoryNv::new(16));
        cache.store(ch(11)).unwrap();
        assert_eq!(cache.store(ch(11)), Ok(false));
        assert_eq!(cache.writes(), 1);
        assert_eq!(cache.memory().commits(), 1);

        assert_eq!(cache.store(ch(1)), Ok(true));
        assert_eq!(cache.writes(), 2);
    }

    #[test]
    fn test_legacy_single_byte_image_reads_unset() {
        let mut bytes = vec![0xFF; 16];
        bytes[0] = 6;
        let mut cache = ChannelCache::new(MemoryNv::from_bytes(bytes));
        assert_eq!(cache.load(), None);
    }

    #[test]
    fn test_corrupt_checksum_reads_unset() {
        let mut cache = ChannelCache::new(MemoryNv::new(16));
        cache.store(ch(3)).unwrap();
        let mut bytes = cache.memory().bytes().to_vec();
        bytes[2] ^= 0x5A;
        let mut cache = ChannelCache::new(MemoryNv::from_bytes(bytes));
        assert_eq!(cache.load(), None);
    }

    #[test]
    fn test_out_of_range_channel_reads_unset() {
        let head = [20u8, LAYOUT_VERSION];
        let bytes = vec![head[0], head[1], CRC8.checksum(&head)];
        let mut cache = ChannelCache::new(MemoryNv::from_bytes(bytes));
        assert_eq!(cache.load(), None);
    }

    #[test]
    fn test_too_small_memory_errors() {
        let mut cache = ChannelCache::new(MemoryNv::new(2));
        assert!(matches!(cache.store(ch(1)), Err(StorageError::Io(_))));
        assert_eq!(cache.load(), None);
    }

    #[test]
    fn test_file_backed_cache_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("channel.bin");

        {
            let mut cache = ChannelCache::new(FileNv::open(&path).unwrap());
            assert_eq!(cache.load(), None);
            assert_eq!(cache.store(ch(9)), Ok(true));
        }

        let mut cache = ChannelCache::new(FileNv::open(&path).unwrap());
        assert_eq!(cache.load(), Some(ch(9)));
        assert_eq!(cache.store(ch(9)), Ok(false));
    }
}
