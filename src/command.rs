//! FINS commands
//!
//! A [`Command`] turns its parameters into a [`FinsRequest`] and interprets
//! the data of the matching [`FinsResponse`]. The channel never looks inside
//! either; it only moves the bytes.
//!
//! | Command | MRC/SRC | Output |
//! |---------|---------|--------|
//! | [`ReadWords`] | 01/01 | `Vec<u16>` |
//! | [`WriteWords`] | 01/02 | `()` |
//! | [`ReadBits`] | 01/01 | `Vec<bool>` |
//! | [`WriteBits`] | 01/02 | `()` |
//! | [`ReadCycleTime`] | 06/20 | [`CycleTime`] |
//! | [`ReadClock`] | 07/01 | [`ClockReading`] |
//! | [`WriteClock`] | 07/02 | `()` |

use std::fmt;
use std::time::Duration;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::envelope::{FinsRequest, FinsResponse};
use crate::error::{FinsError, FinsResult};

/// Memory area read/write (MRC)
pub const MRC_MEMORY_AREA: u8 = 0x01;
pub const SRC_MEMORY_AREA_READ: u8 = 0x01;
pub const SRC_MEMORY_AREA_WRITE: u8 = 0x02;
/// Status read (MRC)
pub const MRC_STATUS: u8 = 0x06;
pub const SRC_READ_CYCLE_TIME: u8 = 0x20;
/// Time data (MRC)
pub const MRC_TIME_DATA: u8 = 0x07;
pub const SRC_READ_CLOCK: u8 = 0x01;
pub const SRC_WRITE_CLOCK: u8 = 0x02;

/// Largest word count accepted by a single memory area command
pub const MAX_WORDS_PER_COMMAND: u16 = 999;

/// Request/response pair understood by the PLC
pub trait Command {
    type Output;

    /// Request carrying this command's parameters
    fn request(&self) -> FinsRequest;

    /// Interpret a successful response
    fn decode(&self, response: &FinsResponse) -> FinsResult<Self::Output>;
}

/// Memory areas addressed by word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryWordArea {
    DataMemory,
    CommonIo,
    Work,
    Holding,
    Auxiliary,
    ExtendedMemoryBank0,
    ExtendedMemoryBank1,
    ExtendedMemoryBank2,
    ExtendedMemoryBank3,
}

impl MemoryWordArea {
    pub fn code(self) -> u8 {
        match self {
            MemoryWordArea::DataMemory => 0x82,
            MemoryWordArea::CommonIo => 0xB0,
            MemoryWordArea::Work => 0xB1,
            MemoryWordArea::Holding => 0xB2,
            MemoryWordArea::Auxiliary => 0xB3,
            // CJ2 CPUs use 0x50-0x53 for the same banks
            MemoryWordArea::ExtendedMemoryBank0 => 0xA0,
            MemoryWordArea::ExtendedMemoryBank1 => 0xA1,
            MemoryWordArea::ExtendedMemoryBank2 => 0xA2,
            MemoryWordArea::ExtendedMemoryBank3 => 0xA3,
        }
    }
}

impl fmt::Display for MemoryWordArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemoryWordArea::DataMemory => "DM",
            MemoryWordArea::CommonIo => "CIO",
            MemoryWordArea::Work => "W",
            MemoryWordArea::Holding => "H",
            MemoryWordArea::Auxiliary => "A",
            MemoryWordArea::ExtendedMemoryBank0 => "E0",
            MemoryWordArea::ExtendedMemoryBank1 => "E1",
            MemoryWordArea::ExtendedMemoryBank2 => "E2",
            MemoryWordArea::ExtendedMemoryBank3 => "E3",
        };
        f.write_str(name)
    }
}

/// Memory areas addressed by bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryBitArea {
    DataMemory,
    CommonIo,
    Work,
    Holding,
    Auxiliary,
}

impl MemoryBitArea {
    pub fn code(self) -> u8 {
        match self {
            MemoryBitArea::DataMemory => 0x02,
            MemoryBitArea::CommonIo => 0x30,
            MemoryBitArea::Work => 0x31,
            MemoryBitArea::Holding => 0x32,
            MemoryBitArea::Auxiliary => 0x33,
        }
    }
}

/// Area code, address (2) and bit index
fn memory_address(area_code: u8, address: u16, bit: u8, count: u16) -> Vec<u8> {
    let mut body = Vec::with_capacity(6);
    body.push(area_code);
    body.extend_from_slice(&address.to_be_bytes());
    body.push(bit);
    body.extend_from_slice(&count.to_be_bytes());
    body
}

fn check_word_count(count: usize) -> FinsResult<u16> {
    if count == 0 || count > MAX_WORDS_PER_COMMAND as usize {
        return Err(FinsError::invalid_data(format!(
            "word count {} outside 1-{}",
            count, MAX_WORDS_PER_COMMAND
        )));
    }
    Ok(count as u16)
}

fn check_bit(bit: u8) -> FinsResult<()> {
    if bit > 15 {
        return Err(FinsError::invalid_data(format!("bit index {} outside 0-15", bit)));
    }
    Ok(())
}

fn require_len(response: &FinsResponse, expected: usize) -> FinsResult<()> {
    if response.data.len() < expected {
        return Err(FinsError::invalid_data(format!(
            "response data length {} too short, expected {}",
            response.data.len(),
            expected
        )));
    }
    Ok(())
}

/// Read consecutive words
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadWords {
    area: MemoryWordArea,
    address: u16,
    count: u16,
}

impl ReadWords {
    pub fn new(area: MemoryWordArea, address: u16, count: u16) -> FinsResult<Self> {
        let count = check_word_count(count as usize)?;
        Ok(Self {
            area,
            address,
            count,
        })
    }
}

impl Command for ReadWords {
    type Output = Vec<u16>;

    fn request(&self) -> FinsRequest {
        FinsRequest::new(
            MRC_MEMORY_AREA,
            SRC_MEMORY_AREA_READ,
            memory_address(self.area.code(), self.address, 0, self.count),
        )
    }

    fn decode(&self, response: &FinsResponse) -> FinsResult<Vec<u16>> {
        let len = self.count as usize * 2;
        require_len(response, len)?;
        Ok(response.data[..len]
            .chunks_exact(2)
            .map(|w| u16::from_be_bytes([w[0], w[1]]))
            .collect())
    }
}

/// Write consecutive words
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteWords {
    area: MemoryWordArea,
    address: u16,
    values: Vec<u16>,
}

impl WriteWords {
    pub fn new(area: MemoryWordArea, address: u16, values: impl Into<Vec<u16>>) -> FinsResult<Self> {
        let values = values.into();
        check_word_count(values.len())?;
        Ok(Self {
            area,
            address,
            values,
        })
    }
}

impl Command for WriteWords {
    type Output = ();

    fn request(&self) -> FinsRequest {
        let mut body = memory_address(
            self.area.code(),
            self.address,
            0,
            self.values.len() as u16,
        );
        for value in &self.values {
            body.extend_from_slice(&value.to_be_bytes());
        }
        FinsRequest::new(MRC_MEMORY_AREA, SRC_MEMORY_AREA_WRITE, body)
    }

    fn decode(&self, _response: &FinsResponse) -> FinsResult<()> {
        Ok(())
    }
}

/// Read consecutive bits starting at `address.bit`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadBits {
    area: MemoryBitArea,
    address: u16,
    bit: u8,
    count: u16,
}

impl ReadBits {
    pub fn new(area: MemoryBitArea, address: u16, bit: u8, count: u16) -> FinsResult<Self> {
        check_bit(bit)?;
        let count = check_word_count(count as usize)?;
        Ok(Self {
            area,
            address,
            bit,
            count,
        })
    }
}

impl Command for ReadBits {
    type Output = Vec<bool>;

    fn request(&self) -> FinsRequest {
        FinsRequest::new(
            MRC_MEMORY_AREA,
            SRC_MEMORY_AREA_READ,
            memory_address(self.area.code(), self.address, self.bit, self.count),
        )
    }

    fn decode(&self, response: &FinsResponse) -> FinsResult<Vec<bool>> {
        let len = self.count as usize;
        require_len(response, len)?;
        Ok(response.data[..len].iter().map(|&b| b != 0).collect())
    }
}

/// Write consecutive bits starting at `address.bit`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteBits {
    area: MemoryBitArea,
    address: u16,
    bit: u8,
    values: Vec<bool>,
}

impl WriteBits {
    pub fn new(
        area: MemoryBitArea,
        address: u16,
        bit: u8,
        values: impl Into<Vec<bool>>,
    ) -> FinsResult<Self> {
        check_bit(bit)?;
        let values = values.into();
        check_word_count(values.len())?;
        Ok(Self {
            area,
            address,
            bit,
            values,
        })
    }
}

impl Command for WriteBits {
    type Output = ();

    fn request(&self) -> FinsRequest {
        let mut body = memory_address(
            self.area.code(),
            self.address,
            self.bit,
            self.values.len() as u16,
        );
        body.extend(self.values.iter().map(|&v| u8::from(v)));
        FinsRequest::new(MRC_MEMORY_AREA, SRC_MEMORY_AREA_WRITE, body)
    }

    fn decode(&self, _response: &FinsResponse) -> FinsResult<()> {
        Ok(())
    }
}

fn to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

fn from_bcd(byte: u8) -> FinsResult<u8> {
    let (high, low) = (byte >> 4, byte & 0x0F);
    if high > 9 || low > 9 {
        return Err(FinsError::invalid_data(format!(
            "0x{:02X} is not a BCD digit pair",
            byte
        )));
    }
    Ok(high * 10 + low)
}

/// PLC clock value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockReading {
    pub date_time: NaiveDateTime,
    /// 0 = Sunday
    pub day_of_week: u8,
}

/// Read the PLC clock
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadClock;

impl Command for ReadClock {
    type Output = ClockReading;

    fn request(&self) -> FinsRequest {
        FinsRequest::new(MRC_TIME_DATA, SRC_READ_CLOCK, Vec::new())
    }

    fn decode(&self, response: &FinsResponse) -> FinsResult<ClockReading> {
        require_len(response, 7)?;
        let d = &response.data;

        let year = from_bcd(d[0])?;
        // Two-digit years below 70 are 20xx
        let year = if year < 70 {
            2000 + year as i32
        } else {
            1900 + year as i32
        };
        let (month, day) = (from_bcd(d[1])?, from_bcd(d[2])?);
        let (hour, minute, second) = (from_bcd(d[3])?, from_bcd(d[4])?, from_bcd(d[5])?);

        let date_time = NaiveDate::from_ymd_opt(year, month as u32, day as u32)
            .and_then(|date| date.and_hms_opt(hour as u32, minute as u32, second as u32))
            .ok_or_else(|| FinsError::invalid_data("invalid date/time from PLC clock"))?;

        Ok(ClockReading {
            date_time,
            day_of_week: from_bcd(d[6])?,
        })
    }
}

/// Set the PLC clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteClock {
    date_time: NaiveDateTime,
    day_of_week: u8,
}

impl WriteClock {
    /// Day of week follows from the date
    pub fn new(date_time: NaiveDateTime) -> FinsResult<Self> {
        let day_of_week = date_time.weekday().num_days_from_sunday() as u8;
        Self::with_day_of_week(date_time, day_of_week)
    }

    pub fn with_day_of_week(date_time: NaiveDateTime, day_of_week: u8) -> FinsResult<Self> {
        if !(1970..=2069).contains(&date_time.year()) {
            return Err(FinsError::invalid_data(format!(
                "year {} cannot be stored in the PLC clock (1970-2069)",
                date_time.year()
            )));
        }
        if day_of_week > 6 {
            return Err(FinsError::invalid_data(format!(
                "day of week {} outside 0-6",
                day_of_week
            )));
        }
        Ok(Self {
            date_time,
            day_of_week,
        })
    }
}

impl Command for WriteClock {
    type Output = ();

    fn request(&self) -> FinsRequest {
        let dt = &self.date_time;
        let body = vec![
            to_bcd((dt.year() % 100) as u8),
            to_bcd(dt.month() as u8),
            to_bcd(dt.day() as u8),
            to_bcd(dt.hour() as u8),
            to_bcd(dt.minute() as u8),
            to_bcd(dt.second() as u8),
            to_bcd(self.day_of_week),
        ];
        FinsRequest::new(MRC_TIME_DATA, SRC_WRITE_CLOCK, body)
    }

    fn decode(&self, _response: &FinsResponse) -> FinsResult<()> {
        Ok(())
    }
}

/// Cycle time statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTime {
    pub average: Duration,
    pub maximum: Duration,
    pub minimum: Duration,
}

/// Read the average, maximum and minimum cycle time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadCycleTime;

/// 8-digit BCD in 0.1 ms units
fn cycle_time(bytes: &[u8]) -> FinsResult<Duration> {
    let mut tenths = 0u64;
    for &b in bytes {
        tenths = tenths * 100 + from_bcd(b)? as u64;
    }
    Ok(Duration::from_micros(tenths * 100))
}

impl Command for ReadCycleTime {
    type Output = CycleTime;

    fn request(&self) -> FinsRequest {
        // 0x01 reads, 0x00 would reset the statistics
        FinsRequest::new(MRC_STATUS, SRC_READ_CYCLE_TIME, vec![0x01])
    }

    fn decode(&self, response: &FinsResponse) -> FinsResult<CycleTime> {
        require_len(response, 12)?;
        let d = &response.data;
        Ok(CycleTime {
            average: cycle_time(&d[0..4])?,
            maximum: cycle_time(&d[4..8])?,
            minimum: cycle_time(&d[8..12])?,
        })
    }
}
