//! BitTrack input parsing and the wear model.
//!
//! A BitTrack directory describes the bit-flip behavior of a traced
//! workload: `bittrack.txt` holds summary key/values (line/page sizes and
//! the average bit-flip probability per write), and `bittrack.bin` holds
//! optional per-page write factors. [`WearModel`] turns either into an
//! integer bit-flip charge per write.

// Imports
use {
	crate::{mem_trace::PageAddr, queues},
	anyhow::Context,
	byteorder::{LittleEndian, ReadBytesExt},
	std::{collections::HashMap, fs, io, path::Path, str},
	wearsim_util::parse,
};

/// BitTrack summary, from `bittrack.txt`
#[derive(Clone, Copy, Debug)]
pub struct Summary {
	/// Line size (bytes, power of two).
	///
	/// Stored under the `BLOCK_SIZE` key.
	pub line_size: u64,

	/// Page size (bytes, power of two, ≥ line size)
	pub page_size: u64,

	/// Number of distinct pages written by the traced workload
	pub n_pages_written: u64,

	/// Average probability of any one bit flipping on a line write
	pub p_bitflip_per_write: f64,
}

impl Summary {
	/// Loads a summary from a key/value file
	pub fn load(path: &Path) -> Result<Self, anyhow::Error> {
		let kv = parse::parse_kv_file(path).context("Unable to parse summary file")?;
		let get = |key: &str| kv.get(key).with_context(|| format!("Missing {key} key"));

		let line_size = get("BLOCK_SIZE")?.parse::<u64>().context("Unable to parse BLOCK_SIZE")?;
		let page_size = get("PAGE_SIZE")?.parse::<u64>().context("Unable to parse PAGE_SIZE")?;
		let n_pages_written = get("N_PAGES_WRITTEN")?
			.parse::<u64>()
			.context("Unable to parse N_PAGES_WRITTEN")?;
		let p_bitflip_per_write = get("P_BITFLIP_PER_WRITE")?
			.parse::<f64>()
			.context("Unable to parse P_BITFLIP_PER_WRITE")?;

		anyhow::ensure!(line_size.is_power_of_two(), "Line size {line_size} must be a power of two");
		anyhow::ensure!(page_size.is_power_of_two(), "Page size {page_size} must be a power of two");
		anyhow::ensure!(
			line_size <= page_size,
			"Line size {line_size} must be at most the page size {page_size}"
		);

		Ok(Self {
			line_size,
			page_size,
			n_pages_written,
			p_bitflip_per_write,
		})
	}

	/// Returns the log2 of the line size
	pub fn line_size_log2(&self) -> u32 {
		self.line_size.trailing_zeros()
	}

	/// Returns the log2 of the page size
	pub fn page_size_log2(&self) -> u32 {
		self.page_size.trailing_zeros()
	}

	/// Returns the bits in a line
	pub fn bits_per_line(&self) -> u64 {
		self.line_size * 8
	}

	/// Returns the bits in a page
	pub fn bits_per_page(&self) -> u64 {
		self.page_size * 8
	}
}

/// Write factor mode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteFactorMode {
	/// Every write charges the workload-wide average bit-flip count
	Average,

	/// Writes charge their page's own bit-flip count, falling back to the
	/// average for unknown pages
	PerPage,
}

impl str::FromStr for WriteFactorMode {
	type Err = anyhow::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.to_lowercase();

		// `av`, `avg`, `average`, ... all match, as do `per`, `page`, `perpage`, ...
		if s.contains("average") || s.contains("avg") {
			return Ok(Self::Average);
		}
		if s.contains("per") || s.contains("page") {
			return Ok(Self::PerPage);
		}

		anyhow::bail!("Unknown write factor mode {s:?} (expected `average` or `perpage`)")
	}
}

/// Wear model.
///
/// Maps a page write to the integer number of bit-flips it is expected to
/// cause.
#[derive(Clone, Debug)]
pub struct WearModel {
	/// Summary the model was built from
	summary: Summary,

	/// Average bit-flips per line write
	average_bfpw: u64,

	/// Per-page bit-flips per line write.
	///
	/// Empty in average mode.
	page_bfpws: HashMap<PageAddr, u64>,
}

impl WearModel {
	/// Loads a wear model from a BitTrack directory.
	///
	/// Expects `bittrack.txt` and `bittrack.bin` inside `bittrack_dir`; the
	/// binary per-page table is only read in [`WriteFactorMode::PerPage`].
	pub fn load(bittrack_dir: &Path, mode: WriteFactorMode) -> Result<Self, anyhow::Error> {
		anyhow::ensure!(
			bittrack_dir.is_dir(),
			"BitTrack path {} isn't a directory",
			bittrack_dir.display()
		);

		let txt_path = bittrack_dir.join("bittrack.txt");
		let bin_path = bittrack_dir.join("bittrack.bin");
		anyhow::ensure!(txt_path.is_file(), "{} does not exist", txt_path.display());
		anyhow::ensure!(bin_path.is_file(), "{} does not exist", bin_path.display());

		let summary = Summary::load(&txt_path).context("Unable to load BitTrack summary")?;

		// The average always comes from the summary
		let average_bfpw = (summary.p_bitflip_per_write * summary.bits_per_line() as f64).ceil() as u64;
		tracing::info!(
			average_wf = summary.p_bitflip_per_write,
			average_bfpw,
			"Loaded BitTrack summary"
		);

		let page_bfpws = match mode {
			WriteFactorMode::Average => HashMap::new(),
			WriteFactorMode::PerPage => Self::load_per_page(&bin_path, &summary)?,
		};

		Ok(Self {
			summary,
			average_bfpw,
			page_bfpws,
		})
	}

	/// Loads the per-page write factor table
	fn load_per_page(path: &Path, summary: &Summary) -> Result<HashMap<PageAddr, u64>, anyhow::Error> {
		/// Size of a `{u64 page_addr, f64 page_wf}` entry on disk
		const ENTRY_BYTE_SIZE: u64 = 16;

		let file = fs::File::open(path).with_context(|| format!("Unable to open {}", path.display()))?;
		let file_size = file.metadata().context("Unable to get per-page table size")?.len();
		anyhow::ensure!(
			file_size % ENTRY_BYTE_SIZE == 0,
			"Per-page table {} size {file_size} isn't a multiple of the entry size",
			path.display()
		);

		let mut reader = io::BufReader::new(file);
		let mut page_bfpws = HashMap::with_capacity((file_size / ENTRY_BYTE_SIZE) as usize);
		for _ in 0..file_size / ENTRY_BYTE_SIZE {
			let page_addr = reader
				.read_u64::<LittleEndian>()
				.context("Unable to read page address")?;
			let page_wf = reader
				.read_f64::<LittleEndian>()
				.context("Unable to read page write factor")?;

			let page_bfpw = (page_wf * summary.bits_per_line() as f64).ceil() as u64;
			page_bfpws.insert(PageAddr::new(page_addr), page_bfpw);
		}

		anyhow::ensure!(
			page_bfpws.len() as u64 == summary.n_pages_written,
			"Page count mismatch between the summary ({}) and the per-page table ({})",
			summary.n_pages_written,
			page_bfpws.len()
		);

		Ok(page_bfpws)
	}

	/// Returns the bit-flip charge of a single line write to `page`.
	///
	/// Pages absent from the per-page table charge the average.
	pub fn bfpw(&self, page: PageAddr) -> u64 {
		match self.page_bfpws.get(&page) {
			Some(&bfpw) => bfpw,
			None => self.average_bfpw,
		}
	}

	/// Returns the average bit-flip charge of a line write
	pub fn average_bfpw(&self) -> u64 {
		self.average_bfpw
	}

	/// Returns the summary this model was built from
	pub fn summary(&self) -> &Summary {
		&self.summary
	}
}

impl queues::WearProfile<PageAddr> for WearModel {
	fn swap_bfs(&self, id: PageAddr) -> u64 {
		// Note: the bit-flip probability of writing one page's contents over
		//       another's is undefined; the newly-mapped page's value is an
		//       approximation.
		self.bfpw(id)
	}

	fn swap_bytes(&self, _id: PageAddr) -> u64 {
		self.summary.page_size
	}
}
