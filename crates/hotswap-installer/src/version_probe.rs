use std::fs;
use std::path::{Path, PathBuf};

use hotswap_core::VersionToken;

/// Reads the product version embedded in an executable.
pub trait VersionProbe {
    fn file_version(&self, path: &Path) -> Option<VersionToken>;
}

/// Reads `<exe>.version` next to the executable. Used on hosts without
/// embedded version resources.
#[derive(Debug, Clone, Copy, Default)]
pub struct SidecarVersionProbe;

impl SidecarVersionProbe {
    pub fn sidecar_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(".version");
        PathBuf::from(name)
    }
}

impl VersionProbe for SidecarVersionProbe {
    fn file_version(&self, path: &Path) -> Option<VersionToken> {
        if !path.is_file() {
            return None;
        }
        let raw = fs::read_to_string(Self::sidecar_path(path)).ok()?;
        let token = VersionToken::parse(&raw);
        (!token.is_empty()).then_some(token)
    }
}

#[cfg(windows)]
#[derive(Debug, Clone, Copy, Default)]
pub struct FileVersionInfoProbe;

#[cfg(windows)]
impl VersionProbe for FileVersionInfoProbe {
    fn file_version(&self, path: &Path) -> Option<VersionToken> {
        use std::ffi::c_void;
        use std::mem::size_of;

        use windows::core::{w, HSTRING};
        use windows::Win32::Storage::FileSystem::{
            GetFileVersionInfoSizeW, GetFileVersionInfoW, VerQueryValueW, VS_FIXEDFILEINFO,
        };

        if !path.is_file() {
            return None;
        }
        let wide = HSTRING::from(path.as_os_str());

        let size = unsafe { GetFileVersionInfoSizeW(&wide, None) };
        if size == 0 {
            return None;
        }
        let mut buffer = vec![0_u8; size as usize];
        unsafe { GetFileVersionInfoW(&wide, None, size, buffer.as_mut_ptr().cast()) }.ok()?;

        let mut info: *mut c_void = std::ptr::null_mut();
        let mut len = 0_u32;
        let found =
            unsafe { VerQueryValueW(buffer.as_ptr().cast(), w!("\\"), &mut info, &mut len) };
        if !found.as_bool() || info.is_null() || (len as usize) < size_of::<VS_FIXEDFILEINFO>() {
            return None;
        }

        let fixed = unsafe { &*(info as *const VS_FIXEDFILEINFO) };
        let (ms, ls) = (fixed.dwFileVersionMS, fixed.dwFileVersionLS);
        Some(VersionToken::parse(&format!(
            "{}.{}.{}.{}",
            ms >> 16,
            ms & 0xffff,
            ls >> 16,
            ls & 0xffff
        )))
    }
}

/// Version probe backed by whatever the host supports.
pub fn host_version_probe() -> Box<dyn VersionProbe + Send + Sync> {
    #[cfg(windows)]
    {
        Box::new(FileVersionInfoProbe)
    }
    #[cfg(not(windows))]
    {
        Box::new(SidecarVersionProbe)
    }
}
