//! Processor memory as seen by the data channel, including the data channel
//! address maps.

use std::ops::{Index, IndexMut};

/// Mask for a 15-bit logical address.
pub const ADDRESS_MASK: u16 = 0o77777;
/// Default memory size: 32K words.
pub const DEFAULT_MEMORY_SIZE: usize = 0o100000;

const PAGE_SHIFT: u16 = 10;
const PAGE_OFFSET_MASK: u16 = (1 << PAGE_SHIFT) - 1;
const PAGES_PER_MAP: usize = 32;
const NUM_MAPS: usize = 4;

/// Map selector for data channel map A.
pub const MAP_A: u8 = 0;
/// Map selector for data channel map B.
pub const MAP_B: u8 = 3;

/// One data channel map: 32 pages of 1K words each.
#[derive(Debug, Clone, Copy)]
struct ChannelMap {
    enabled: bool,
    frames: [u16; PAGES_PER_MAP],
}

impl Default for ChannelMap {
    fn default() -> Self {
        ChannelMap {
            enabled: false,
            frames: [0; PAGES_PER_MAP],
        }
    }
}

/// Word-addressed memory. Addresses outside the installed size are treated
/// the way the hardware treats nonexistent memory: writes vanish and reads
/// return zero.
pub struct Memory {
    data: Vec<u16>,
    maps: [ChannelMap; NUM_MAPS],
}

impl Memory {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
            maps: [ChannelMap::default(); NUM_MAPS],
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Is `address` backed by installed memory?
    pub fn is_valid(&self, address: usize) -> bool {
        address < self.data.len()
    }

    pub fn read(&self, address: usize) -> u16 {
        self.data.get(address).copied().unwrap_or(0)
    }

    pub fn write(&mut self, address: usize, value: u16) {
        if let Some(word) = self.data.get_mut(address) {
            *word = value;
        }
    }

    /// Copy `words` into memory starting at `start`.
    pub fn load(&mut self, start: usize, words: &[u16]) {
        for (i, &word) in words.iter().enumerate() {
            self.write(start + i, word);
        }
    }

    /// Translate a 15-bit logical address through a data channel map. A map
    /// that has not been enabled passes addresses through unchanged.
    pub fn map_address(&self, map: u8, address: u16) -> usize {
        let address = address & ADDRESS_MASK;
        let channel_map = &self.maps[map as usize % NUM_MAPS];
        if !channel_map.enabled {
            return address as usize;
        }
        let frame = channel_map.frames[(address >> PAGE_SHIFT) as usize] as usize;
        (frame << PAGE_SHIFT) | (address & PAGE_OFFSET_MASK) as usize
    }

    /// Point one logical page of a map at a physical frame.
    pub fn set_map_page(&mut self, map: u8, page: usize, frame: u16) {
        self.maps[map as usize % NUM_MAPS].frames[page % PAGES_PER_MAP] = frame;
    }

    pub fn enable_map(&mut self, map: u8, enabled: bool) {
        self.maps[map as usize % NUM_MAPS].enabled = enabled;
    }
}

impl Default for Memory {
    fn default() -> Self {
        Memory::new(DEFAULT_MEMORY_SIZE)
    }
}

impl Index<usize> for Memory {
    type Output = u16;

    fn index(&self, index: usize) -> &Self::Output {
        self.data.index(index)
    }
}

impl IndexMut<usize> for Memory {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        self.data.index_mut(index)
    }
}
