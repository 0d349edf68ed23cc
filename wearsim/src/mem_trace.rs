//! Memory trace parsing.
//!
//! A memory trace is a headerless binary file of fixed-size access records.
//! [`MemTraceReader`] streams it cyclically, so multi-pass simulations can
//! keep calling [`read_next`](MemTraceReader::read_next) past the end of the
//! file, with a bounded in-memory window regardless of the file size.

// Imports
use {
	anyhow::Context,
	byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt},
	itertools::Itertools,
	std::{
		collections::HashMap,
		fs,
		io::{self, Read, Seek},
		path::Path,
	},
};

/// Default read window: ~8 GiB
pub const DEFAULT_BUFFER_SIZE_BYTES: u64 = 8589934592;

/// Memory trace reader
#[derive(Debug)]
pub struct MemTraceReader {
	/// Backing file
	file: fs::File,

	/// File size (bytes)
	file_size: u64,

	/// Read window over the file.
	///
	/// Always holds a whole number of records.
	buf: Vec<u8>,

	/// Offset of the next record within `buf`
	buf_pos: usize,

	/// Whether `buf` holds the entire trace
	resident: bool,

	/// Records in the file
	n_unique: u64,

	/// Records yielded in the current pass
	pass_pos: u64,

	/// Total records yielded
	n_requests: u64,

	/// Times the reader wrapped past the end of the file
	n_full_passes: u64,

	/// Read records in the trace
	n_reads_in_trace: u64,

	/// Write records in the trace
	n_writes_in_trace: u64,

	// First/last records, for metadata queries
	first: Record,
	last:  Record,
}

impl MemTraceReader {
	/// Loads a trace with the default window size
	pub fn load(path: &Path) -> Result<Self, anyhow::Error> {
		Self::load_with_buffer_size(path, DEFAULT_BUFFER_SIZE_BYTES)
	}

	/// Loads a trace, using a read window of (at most) `buffer_size_bytes`.
	///
	/// The window is rounded down to a whole number of records and clamped
	/// to the file size. Performs a full scan to count reads and writes.
	pub fn load_with_buffer_size(path: &Path, buffer_size_bytes: u64) -> Result<Self, anyhow::Error> {
		let mut file = fs::File::open(path).with_context(|| format!("Unable to open trace file {}", path.display()))?;

		let file_size = file.metadata().context("Unable to get trace file size")?.len();
		anyhow::ensure!(file_size != 0, "Trace file {} is empty", path.display());
		anyhow::ensure!(
			file_size % Record::BYTE_SIZE as u64 == 0,
			"Trace file {} size {file_size} isn't a multiple of the record size",
			path.display()
		);
		let n_unique = file_size / Record::BYTE_SIZE as u64;

		// Scan the trace once for its read/write counts and first/last records
		let mut first = None;
		let mut last = None;
		let mut n_reads_in_trace = 0;
		let mut n_writes_in_trace = 0;
		let mut page_write_counts = HashMap::<u64, u64>::new();
		{
			let mut scan = io::BufReader::with_capacity(1 << 20, &mut file);
			for _ in 0..n_unique {
				let record = Record::from_reader(&mut scan).context("Unable to read record during load scan")?;
				match record.kind {
					AccessKind::Read => n_reads_in_trace += 1,
					AccessKind::Write => {
						n_writes_in_trace += 1;
						// Coarse page granularity, just for the load-time summary
						*page_write_counts.entry(record.line_addr >> 14).or_insert(0) += 1;
					},
				}

				first.get_or_insert(record);
				last = Some(record);
			}
		}
		if let Some((min, max)) = page_write_counts.values().minmax().into_option() {
			tracing::info!("Page write counts: min {min}, max {max}");
		}

		// Size the window and prime it from the start of the file
		let buffer_size_bytes = buffer_size_bytes.min(file_size);
		let buffer_size_bytes = u64::max(buffer_size_bytes - buffer_size_bytes % Record::BYTE_SIZE as u64, Record::BYTE_SIZE as u64);
		file.rewind().context("Unable to rewind trace file")?;

		let mut reader = Self {
			file,
			file_size,
			buf: vec![0; buffer_size_bytes as usize],
			buf_pos: 0,
			resident: buffer_size_bytes == file_size,
			n_unique,
			pass_pos: 0,
			n_requests: 0,
			n_full_passes: 0,
			n_reads_in_trace,
			n_writes_in_trace,
			first: first.expect("Trace has at least one record"),
			last: last.expect("Trace has at least one record"),
		};
		reader.refill(true)?;

		Ok(reader)
	}

	/// Reads the next record.
	///
	/// After the last record of a pass, transparently wraps to the start of
	/// the file and increments the full-pass counter.
	pub fn read_next(&mut self) -> Result<Record, anyhow::Error> {
		if self.buf_pos == self.buf.len() {
			self.refill(false)?;
		}

		if self.pass_pos == self.n_unique {
			self.n_full_passes += 1;
			self.pass_pos = 0;
		}

		let record =
			Record::from_reader(&mut &self.buf[self.buf_pos..]).context("Unable to decode record in window")?;
		self.buf_pos += Record::BYTE_SIZE;
		self.pass_pos += 1;
		self.n_requests += 1;

		Ok(record)
	}

	/// Returns whether the next [`read_next`](Self::read_next) call would wrap
	/// to the start of the file
	pub fn is_end_of_pass(&self) -> bool {
		self.pass_pos == self.n_unique
	}

	/// Returns to the beginning of the file.
	///
	/// If `inc_passes`, counts the abandoned position as a completed pass.
	pub fn reset(&mut self, inc_passes: bool) -> Result<(), anyhow::Error> {
		self.file.rewind().context("Unable to rewind trace file")?;
		self.pass_pos = 0;
		self.refill(true)?;

		if inc_passes {
			self.n_full_passes += 1;
		}

		Ok(())
	}

	/// Returns the first record of the trace
	pub fn first_record(&self) -> Record {
		self.first
	}

	/// Returns the last record of the trace
	pub fn last_record(&self) -> Record {
		self.last
	}

	/// Returns the total records yielded so far
	pub fn n_requests(&self) -> u64 {
		self.n_requests
	}

	/// Returns the number of times the reader wrapped past the end of the file
	pub fn n_full_passes(&self) -> u64 {
		self.n_full_passes
	}

	/// Returns the number of records in the file
	pub fn n_unique(&self) -> u64 {
		self.n_unique
	}

	/// Returns the number of read records in the trace
	pub fn n_reads_in_trace(&self) -> u64 {
		self.n_reads_in_trace
	}

	/// Returns the number of write records in the trace
	pub fn n_writes_in_trace(&self) -> u64 {
		self.n_writes_in_trace
	}

	/// Refills the read window from the current file position.
	///
	/// When fewer bytes remain than the window holds, wraps around: reads to
	/// the end of the file, then continues from the beginning, so callers
	/// never observe the file boundary.
	fn refill(&mut self, force: bool) -> Result<(), anyhow::Error> {
		self.buf_pos = 0;

		// No need to re-read when the entire trace is resident
		// (with the exception of the very first, forced, fill)
		if self.resident && !force {
			return Ok(());
		}

		let pos = self.file.stream_position().context("Unable to get trace file position")?;
		let bytes_till_end = (self.file_size - pos) as usize;

		if bytes_till_end >= self.buf.len() {
			self.file.read_exact(&mut self.buf).context("Unable to refill trace window")?;
		} else {
			self.file
				.read_exact(&mut self.buf[..bytes_till_end])
				.context("Unable to read trace tail")?;
			self.file.rewind().context("Unable to rewind trace file")?;
			self.file
				.read_exact(&mut self.buf[bytes_till_end..])
				.context("Unable to refill trace window")?;
		}

		Ok(())
	}
}

/// Trace record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Record {
	/// Originating node (15 bits)
	pub node: u16,

	/// Access kind
	pub kind: AccessKind,

	/// Cache-line address
	pub line_addr: u64,

	/// Cycle the access occurred at.
	///
	/// Non-decreasing in trace order, but not strictly increasing.
	pub cycle: u64,
}

impl Record {
	/// Size of this record on disk
	pub const BYTE_SIZE: usize = 18;

	/// Parses a record from a reader
	pub fn from_reader<R: io::Read>(reader: &mut R) -> Result<Self, anyhow::Error> {
		// Node and access kind share a word: node in the low 15 bits,
		// the kind in the top bit.
		let node_with_kind = reader
			.read_u16::<LittleEndian>()
			.context("Unable to read node + access kind")?;
		let node = node_with_kind & 0x7fff;
		let kind = match node_with_kind >> 15 {
			0 => AccessKind::Read,
			_ => AccessKind::Write,
		};

		let line_addr = reader
			.read_u64::<LittleEndian>()
			.context("Unable to read line address")?;
		let cycle = reader.read_u64::<LittleEndian>().context("Unable to read cycle")?;

		Ok(Self {
			node,
			kind,
			line_addr,
			cycle,
		})
	}

	/// Writes a record to a writer
	pub fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<(), anyhow::Error> {
		anyhow::ensure!(self.node < 1 << 15, "Node {} doesn't fit in 15 bits", self.node);

		let kind_encoded = match self.kind {
			AccessKind::Read => 0,
			AccessKind::Write => 1 << 15,
		};
		writer
			.write_u16::<LittleEndian>(self.node | kind_encoded)
			.context("Unable to write node + access kind")?;
		writer
			.write_u64::<LittleEndian>(self.line_addr)
			.context("Unable to write line address")?;
		writer.write_u64::<LittleEndian>(self.cycle).context("Unable to write cycle")?;

		Ok(())
	}

	/// Returns the page this record's line address falls in
	pub fn page_addr(&self, line_size_log2: u32, page_size_log2: u32) -> PageAddr {
		PageAddr::from_line_addr(self.line_addr, line_size_log2, page_size_log2)
	}
}

/// Record access kind
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessKind {
	/// Read
	Read,

	/// Write
	Write,
}

/// Page address
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct PageAddr(u64);

impl std::fmt::Debug for PageAddr {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_tuple("PageAddr")
			.field(&format_args!("{:#010x}", self.0))
			.finish()
	}
}

impl PageAddr {
	/// Placeholder address for frames that aren't mapped by any real page
	pub const FILLER: Self = Self(0);

	/// Creates a page address from a raw `u64`
	pub fn new(page: u64) -> Self {
		Self(page)
	}

	/// Converts a line address to the page address containing it
	pub fn from_line_addr(line_addr: u64, line_size_log2: u32, page_size_log2: u32) -> Self {
		Self(line_addr >> (page_size_log2 - line_size_log2))
	}

	/// Returns the page address as a `u64`
	pub fn to_u64(self) -> u64 {
		self.0
	}
}

#[cfg(test)]
mod tests {
	// Imports
	use {super::*, std::io::Write, tempfile::NamedTempFile};

	fn record(line_addr: u64, kind: AccessKind, cycle: u64) -> Record {
		Record {
			node: 0,
			kind,
			line_addr,
			cycle,
		}
	}

	fn write_trace(records: &[Record]) -> NamedTempFile {
		let mut file = NamedTempFile::new().expect("Unable to create temp file");
		for record in records {
			record.to_writer(file.as_file_mut()).expect("Unable to write record");
		}
		file.flush().expect("Unable to flush temp file");
		file
	}

	#[test]
	fn record_round_trip() {
		let record = Record {
			node: 0x7abc,
			kind: AccessKind::Write,
			line_addr: 0xdead_beef_cafe,
			cycle: 12345,
		};

		let mut bytes = vec![];
		record.to_writer(&mut bytes).expect("Unable to write record");
		assert_eq!(bytes.len(), Record::BYTE_SIZE);

		let parsed = Record::from_reader(&mut bytes.as_slice()).expect("Unable to parse record");
		assert_eq!(parsed, record);
	}

	#[test]
	fn record_rejects_wide_node() {
		let record = Record {
			node: 1 << 15,
			kind: AccessKind::Read,
			line_addr: 0,
			cycle: 0,
		};
		assert!(record.to_writer(&mut vec![]).is_err());
	}

	#[test]
	fn load_counts() {
		let file = write_trace(&[
			record(0x100, AccessKind::Read, 1),
			record(0x200, AccessKind::Write, 2),
			record(0x300, AccessKind::Write, 3),
		]);

		let reader = MemTraceReader::load(file.path()).expect("Unable to load trace");
		assert_eq!(reader.n_unique(), 3);
		assert_eq!(reader.n_reads_in_trace(), 1);
		assert_eq!(reader.n_writes_in_trace(), 2);
		assert_eq!(reader.first_record().line_addr, 0x100);
		assert_eq!(reader.last_record().cycle, 3);
	}

	#[test]
	fn cyclic_wrap_with_small_window() {
		let file = write_trace(&[
			record(0, AccessKind::Write, 0),
			record(1, AccessKind::Write, 1),
			record(2, AccessKind::Write, 2),
		]);

		// Window of 2 records, 7 reads over a 3-record file
		let mut reader = MemTraceReader::load_with_buffer_size(file.path(), 2 * Record::BYTE_SIZE as u64)
			.expect("Unable to load trace");

		let yielded = (0..7)
			.map(|_| reader.read_next().expect("Unable to read record").line_addr)
			.collect::<Vec<_>>();
		assert_eq!(yielded, vec![0, 1, 2, 0, 1, 2, 0]);
		assert_eq!(reader.n_full_passes(), 2);
		assert_eq!(reader.n_requests(), 7);
	}

	#[test]
	fn single_record_window() {
		let file = write_trace(&[
			record(10, AccessKind::Write, 0),
			record(11, AccessKind::Write, 1),
		]);

		// A 1-byte request still gets a window of one whole record
		let mut reader = MemTraceReader::load_with_buffer_size(file.path(), 1).expect("Unable to load trace");
		let yielded = (0..5)
			.map(|_| reader.read_next().expect("Unable to read record").line_addr)
			.collect::<Vec<_>>();
		assert_eq!(yielded, vec![10, 11, 10, 11, 10]);
	}

	#[test]
	fn end_of_pass() {
		let file = write_trace(&[
			record(0, AccessKind::Write, 0),
			record(1, AccessKind::Write, 1),
		]);

		let mut reader = MemTraceReader::load(file.path()).expect("Unable to load trace");
		assert!(!reader.is_end_of_pass());
		reader.read_next().expect("Unable to read record");
		assert!(!reader.is_end_of_pass());
		reader.read_next().expect("Unable to read record");
		assert!(reader.is_end_of_pass());

		// Wrapping resumes the next pass
		reader.read_next().expect("Unable to read record");
		assert!(!reader.is_end_of_pass());
		assert_eq!(reader.n_full_passes(), 1);
	}

	#[test]
	fn reset_replays_identical_records() {
		let records = (0..10)
			.map(|idx| record(idx * 0x40, AccessKind::Write, idx))
			.collect::<Vec<_>>();
		let file = write_trace(&records);

		// Small window, to exercise wrap-around refills
		let mut reader = MemTraceReader::load_with_buffer_size(file.path(), 3 * Record::BYTE_SIZE as u64)
			.expect("Unable to load trace");

		let first_pass = (0..10)
			.map(|_| reader.read_next().expect("Unable to read record"))
			.collect::<Vec<_>>();
		assert_eq!(first_pass, records);

		// Disturb the cursor mid-pass, then reset
		for _ in 0..4 {
			reader.read_next().expect("Unable to read record");
		}
		reader.reset(false).expect("Unable to reset");

		let replay = (0..10)
			.map(|_| reader.read_next().expect("Unable to read record"))
			.collect::<Vec<_>>();
		assert_eq!(replay, records);
	}

	#[test]
	fn reset_can_count_a_pass() {
		let file = write_trace(&[record(0, AccessKind::Write, 0)]);
		let mut reader = MemTraceReader::load(file.path()).expect("Unable to load trace");

		reader.reset(true).expect("Unable to reset");
		assert_eq!(reader.n_full_passes(), 1);
	}

	#[test]
	fn rejects_empty_file() {
		let file = NamedTempFile::new().expect("Unable to create temp file");
		assert!(MemTraceReader::load(file.path()).is_err());
	}

	#[test]
	fn rejects_truncated_file() {
		let mut file = NamedTempFile::new().expect("Unable to create temp file");
		file.write_all(&[0u8; Record::BYTE_SIZE - 1])
			.expect("Unable to write temp file");
		file.flush().expect("Unable to flush temp file");

		assert!(MemTraceReader::load(file.path()).is_err());
	}

	#[test]
	fn page_addr_conversion() {
		// 64 B lines in 4 KiB pages: 64 lines per page
		assert_eq!(PageAddr::from_line_addr(0, 6, 12), PageAddr::new(0));
		assert_eq!(PageAddr::from_line_addr(63, 6, 12), PageAddr::new(0));
		assert_eq!(PageAddr::from_line_addr(64, 6, 12), PageAddr::new(1));
	}
}
