//! Scripted program images
//!
//! A compact image format for homebrew test programs and headless runs. The
//! image declares its program id, the services it starts at boot and how the
//! guest behaves: how many quanta it runs before powering off and, optionally,
//! a quantum at which it faults. Guest progress lives in the `ptm:u` step
//! counter so it is captured by savestates like any other machine state.

use oc_core::error::LoaderError;
use oc_core::ResultStatus;
use oc_hle::{PtmU, ServiceManager};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::{ExecutionCore, Loader, ProgramHandle};

/// Image magic
pub const IMAGE_MAGIC: [u8; 4] = *b"OXPI";
pub const IMAGE_VERSION: u16 = 1;
/// Conventional file extension
pub const IMAGE_EXTENSION: &str = "oxp";

const FLAG_EXECUTABLE: u16 = 0x0001;
const HEADER_SIZE: usize = 26;

/// Fault the guest raises at a fixed quantum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    SystemFiles,
    ExternalLink,
    Unknown,
}

impl FaultKind {
    fn code(self) -> u8 {
        match self {
            Self::SystemFiles => 1,
            Self::ExternalLink => 2,
            Self::Unknown => 3,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::SystemFiles),
            2 => Some(Self::ExternalLink),
            3 => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Status the core reports for this fault
    pub fn status(self) -> ResultStatus {
        match self {
            Self::SystemFiles => ResultStatus::ErrorSystemFiles,
            Self::ExternalLink => ResultStatus::ErrorExternalLinkDisconnected,
            Self::Unknown => ResultStatus::ErrorUnknown,
        }
    }
}

/// Parsed program image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramImage {
    pub program_id: u64,
    pub executable: bool,
    /// Quanta the guest runs before it asks to power off; 0 runs until stopped
    pub run_quanta: u32,
    /// Services started at boot, in order
    pub services: Vec<String>,
    /// Quantum (1-based) at which the guest faults
    pub fault: Option<(u32, FaultKind)>,
}

impl ProgramImage {
    pub fn new(program_id: u64) -> Self {
        Self {
            program_id,
            executable: true,
            run_quanta: 0,
            services: Vec::new(),
            fault: None,
        }
    }

    pub fn with_services(mut self, services: &[&str]) -> Self {
        self.services = services.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_run_quanta(mut self, quanta: u32) -> Self {
        self.run_quanta = quanta;
        self
    }

    pub fn with_fault(mut self, quantum: u32, kind: FaultKind) -> Self {
        self.fault = Some((quantum, kind));
        self
    }

    /// Encode the image. Fails if there are more than 255 services or a
    /// service name is longer than 255 bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, LoaderError> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.services.iter().map(|s| s.len() + 1).sum::<usize>());
        out.extend_from_slice(&IMAGE_MAGIC);
        out.extend_from_slice(&IMAGE_VERSION.to_le_bytes());
        let flags = if self.executable { FLAG_EXECUTABLE } else { 0 };
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&self.program_id.to_le_bytes());
        out.extend_from_slice(&self.run_quanta.to_le_bytes());
        let (fault_at, fault_kind) = self.fault.map_or((0, 0), |(at, kind)| (at, kind.code()));
        out.extend_from_slice(&fault_at.to_le_bytes());
        out.push(fault_kind);
        let count = u8::try_from(self.services.len())
            .map_err(|_| LoaderError::InvalidImage(format!("too many services: {}", self.services.len())))?;
        out.push(count);
        for service in &self.services {
            let len = u8::try_from(service.len())
                .map_err(|_| LoaderError::InvalidImage(format!("service name too long: {} bytes", service.len())))?;
            out.push(len);
            out.extend_from_slice(service.as_bytes());
        }
        Ok(out)
    }

    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        let bytes = self.to_bytes().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        fs::write(path, bytes)
    }

    /// Whether `data` starts with the image magic
    pub fn sniff(data: &[u8]) -> bool {
        data.starts_with(&IMAGE_MAGIC)
    }

    pub fn parse(data: &[u8]) -> Result<Self, LoaderError> {
        if !Self::sniff(data) {
            return Err(LoaderError::Unsupported("missing OXPI magic".to_string()));
        }
        if data.len() < HEADER_SIZE {
            return Err(LoaderError::InvalidImage(format!(
                "image too small: {} bytes (minimum {} bytes)",
                data.len(),
                HEADER_SIZE
            )));
        }

        let mut reader = ByteReader::new(&data[IMAGE_MAGIC.len()..]);
        let version = reader.u16()?;
        if version != IMAGE_VERSION {
            return Err(LoaderError::InvalidImage(format!("unsupported image version {}", version)));
        }
        let flags = reader.u16()?;
        let program_id = reader.u64()?;
        let run_quanta = reader.u32()?;
        let fault_at = reader.u32()?;
        let fault_code = reader.u8()?;
        let fault = match (fault_at, fault_code) {
            (0, _) | (_, 0) => None,
            (at, code) => {
                let kind = FaultKind::from_code(code)
                    .ok_or_else(|| LoaderError::InvalidImage(format!("unknown fault kind {}", code)))?;
                Some((at, kind))
            }
        };

        let count = reader.u8()?;
        let mut services = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let len = reader.u8()? as usize;
            let bytes = reader.bytes(len)?;
            let name = std::str::from_utf8(bytes)
                .map_err(|_| LoaderError::InvalidImage("service name is not UTF-8".to_string()))?;
            services.push(name.to_string());
        }

        Ok(Self {
            program_id,
            executable: flags & FLAG_EXECUTABLE != 0,
            run_quanta,
            services,
            fault,
        })
    }
}

struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], LoaderError> {
        let end = self.pos.checked_add(len).filter(|&end| end <= self.data.len()).ok_or_else(|| {
            LoaderError::InvalidImage(format!("truncated image at offset {}", self.pos + IMAGE_MAGIC.len()))
        })?;
        let data = self.data;
        let out = &data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], LoaderError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, LoaderError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, LoaderError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, LoaderError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, LoaderError> {
        Ok(u64::from_le_bytes(self.array()?))
    }
}

/// Loader for [`ProgramImage`] files
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageLoader;

impl ImageLoader {
    pub fn new() -> Self {
        Self
    }
}

impl Loader for ImageLoader {
    fn resolve(&self, path: &Path) -> Result<Box<dyn ProgramHandle>, ResultStatus> {
        let data = fs::read(path).map_err(|e| {
            warn!("Failed to open program {}: {}", path.display(), e);
            ResultStatus::ErrorGetLoader
        })?;
        if !ProgramImage::sniff(&data) {
            debug!("{} is not a program image", path.display());
            return Err(ResultStatus::from(&LoaderError::Unsupported(path.display().to_string())));
        }
        Ok(Box::new(ImageHandle {
            path: path.to_path_buf(),
            image: ProgramImage::parse(&data),
        }))
    }
}

struct ImageHandle {
    path: PathBuf,
    image: Result<ProgramImage, LoaderError>,
}

impl ImageHandle {
    fn image(&self) -> Result<&ProgramImage, ResultStatus> {
        self.image.as_ref().map_err(|e| {
            error!("{}: {}", self.path.display(), e);
            ResultStatus::from(e)
        })
    }
}

impl ProgramHandle for ImageHandle {
    fn read_program_id(&self) -> Result<u64, ResultStatus> {
        Ok(self.image()?.program_id)
    }

    fn is_executable(&self) -> Result<bool, ResultStatus> {
        Ok(self.image()?.executable)
    }

    fn load(&mut self, services: &mut ServiceManager) -> Result<Box<dyn ExecutionCore>, ResultStatus> {
        let image = self.image()?.clone();
        if !image.executable {
            let err = LoaderError::NotExecutable(self.path.display().to_string());
            error!("{}", err);
            return Err(ResultStatus::from(&err));
        }

        for key in &image.services {
            if let Err(e) = services.start_service(key) {
                error!("Program {} requires service {}: {}", self.path.display(), key, e);
                return Err(ResultStatus::ErrorLoader);
            }
        }

        info!(
            "Loaded program {:016X} from {} ({} boot services)",
            image.program_id,
            self.path.display(),
            image.services.len()
        );
        Ok(Box::new(ScriptedCore::new(&image)))
    }
}

/// Execution core for scripted images
#[derive(Debug, Clone)]
pub struct ScriptedCore {
    run_quanta: u32,
    fault: Option<(u32, FaultKind)>,
    details: String,
}

impl ScriptedCore {
    pub fn new(image: &ProgramImage) -> Self {
        Self {
            run_quanta: image.run_quanta,
            fault: image.fault,
            details: String::new(),
        }
    }
}

impl ExecutionCore for ScriptedCore {
    fn run_quantum(&mut self, services: &mut ServiceManager) -> ResultStatus {
        let ptm = match services.start::<PtmU>() {
            Ok(ptm) => ptm,
            Err(e) => {
                self.details = e.to_string();
                return ResultStatus::ErrorUnknown;
            }
        };
        if ptm.shutdown_requested() {
            return ResultStatus::ShutdownRequested;
        }

        ptm.add_steps(1);
        let elapsed = ptm.step_count();

        if let Some((at, kind)) = self.fault {
            if elapsed == at {
                self.details = format!("guest fault {:?} at quantum {}", kind, at);
                return kind.status();
            }
        }
        if self.run_quanta != 0 && elapsed >= self.run_quanta {
            ptm.request_shutdown();
            return ResultStatus::ShutdownRequested;
        }
        ResultStatus::Success
    }

    fn status_details(&self) -> String {
        self.details.clone()
    }
}
