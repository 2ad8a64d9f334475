//! 文件映射共享内存段（Linux）
//!
//! 段布局（`repr(C)`）：
//!
//! ```text
//! magic: u32 | version: u32 | bus_sema: sem_t | eyes { connected, right[6], left[6], send_command }
//! ```
//!
//! 首个打开者在持有文件排他锁期间扩展文件、初始化进程共享信号量，
//! 最后写入 magic；其他进程在同一把锁之后校验 magic/version。
//! 眼球字段逐个以 volatile 方式读写，不经过信号量。

use crate::{SharedState, ShmError};
use eyes_protocol::{EyeSide, EyesState};
use fs4::fs_std::FileExt;
use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use tracing::{debug, info, warn};

/// "EYES"
pub const SEGMENT_MAGIC: u32 = 0x4559_4553;
pub const SEGMENT_VERSION: u32 = 1;

#[repr(C)]
struct RawSide {
    state: i32,
    lid: i32,
    movement: i32,
    position: i32,
    blink: i32,
    pupil: i32,
}

#[repr(C)]
struct RawEyes {
    connected: i32,
    right: RawSide,
    left: RawSide,
    send_command: i32,
}

#[repr(C)]
struct SegmentLayout {
    magic: u32,
    version: u32,
    bus_sema: libc::sem_t,
    eyes: RawEyes,
}

unsafe fn load_side(side: *const RawSide) -> EyeSide {
    unsafe {
        EyeSide {
            state: ptr::read_volatile(&raw const (*side).state),
            lid: ptr::read_volatile(&raw const (*side).lid),
            movement: ptr::read_volatile(&raw const (*side).movement),
            position: ptr::read_volatile(&raw const (*side).position),
            blink: ptr::read_volatile(&raw const (*side).blink),
            pupil: ptr::read_volatile(&raw const (*side).pupil),
        }
    }
}

unsafe fn store_side(side: *mut RawSide, value: &EyeSide) {
    unsafe {
        ptr::write_volatile(&raw mut (*side).state, value.state);
        ptr::write_volatile(&raw mut (*side).lid, value.lid);
        ptr::write_volatile(&raw mut (*side).movement, value.movement);
        ptr::write_volatile(&raw mut (*side).position, value.position);
        ptr::write_volatile(&raw mut (*side).blink, value.blink);
        ptr::write_volatile(&raw mut (*side).pupil, value.pupil);
    }
}

/// 映射到进程地址空间的共享状态段
///
/// # 示例
///
/// ```no_run
/// use eyes_shm::{SharedState, ShmSegment, DEFAULT_SHM_PATH};
///
/// let segment = ShmSegment::open_or_create(DEFAULT_SHM_PATH).unwrap();
/// let eyes = segment.read_eyes();
/// println!("right pupil: {}", eyes.right.pupil);
/// ```
pub struct ShmSegment {
    layout: NonNull<SegmentLayout>,
    // 必须比 layout 指针活得久
    _mmap: MmapMut,
    path: PathBuf,
    created: bool,
}

// SAFETY: 段内字段只经由 volatile 访问或进程共享信号量访问，
// 本身就面向多个进程并发使用。
unsafe impl Send for ShmSegment {}
unsafe impl Sync for ShmSegment {}

impl std::fmt::Debug for ShmSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShmSegment")
            .field("path", &self.path)
            .field("created", &self.created)
            .finish()
    }
}

impl ShmSegment {
    /// 段的最小字节数
    pub const fn layout_size() -> usize {
        std::mem::size_of::<SegmentLayout>()
    }

    /// 打开已存在的段，或在不存在时创建并初始化
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self, ShmError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;

        file.lock_exclusive()?;
        let result = Self::attach_locked(&file, path);
        if let Err(e) = FileExt::unlock(&file) {
            warn!("Failed to release init lock on {}: {}", path.display(), e);
        }
        result
    }

    fn attach_locked(file: &File, path: &Path) -> Result<Self, ShmError> {
        let required = Self::layout_size();
        let actual = file.metadata()?.len() as usize;

        let fresh = actual == 0;
        if fresh {
            file.set_len(required as u64)?;
        } else if actual < required {
            return Err(ShmError::TooSmall { required, actual });
        }

        let mut mmap = unsafe { MmapMut::map_mut(file)? };
        let layout = NonNull::new(mmap.as_mut_ptr() as *mut SegmentLayout)
            .ok_or_else(|| io::Error::other("null mapping"))?;

        let mut segment = Self {
            layout,
            _mmap: mmap,
            path: path.to_path_buf(),
            created: false,
        };

        let magic = unsafe { ptr::read_volatile(&raw const (*segment.raw()).magic) };
        if magic == 0 {
            // 新建，或上一个初始化者中途退出
            segment.initialize()?;
            segment.created = true;
            info!("Created shared eyes segment at {}", path.display());
        } else if magic != SEGMENT_MAGIC {
            return Err(ShmError::BadMagic(magic));
        } else {
            let version = unsafe { ptr::read_volatile(&raw const (*segment.raw()).version) };
            if version != SEGMENT_VERSION {
                return Err(ShmError::BadVersion(version));
            }
            debug!("Attached to shared eyes segment at {}", path.display());
        }

        Ok(segment)
    }

    fn initialize(&mut self) -> Result<(), ShmError> {
        let layout = self.raw();
        unsafe {
            if libc::sem_init(&raw mut (*layout).bus_sema, 1, 1) != 0 {
                return Err(ShmError::Semaphore(io::Error::last_os_error()));
            }
            store_side(&raw mut (*layout).eyes.right, &EyeSide::default());
            store_side(&raw mut (*layout).eyes.left, &EyeSide::default());
            ptr::write_volatile(&raw mut (*layout).eyes.connected, 0);
            ptr::write_volatile(&raw mut (*layout).eyes.send_command, 0);
            ptr::write_volatile(&raw mut (*layout).version, SEGMENT_VERSION);
            // magic 最后写入，标志初始化完成
            ptr::write_volatile(&raw mut (*layout).magic, SEGMENT_MAGIC);
        }
        Ok(())
    }

    fn raw(&self) -> *mut SegmentLayout {
        self.layout.as_ptr()
    }

    fn sema(&self) -> *mut libc::sem_t {
        unsafe { &raw mut (*self.raw()).bus_sema }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 本进程是否完成了段的初始化
    pub fn created(&self) -> bool {
        self.created
    }
}

impl SharedState for ShmSegment {
    fn read_eyes(&self) -> EyesState {
        let layout = self.raw();
        unsafe {
            EyesState::new(
                load_side(&raw const (*layout).eyes.right),
                load_side(&raw const (*layout).eyes.left),
            )
        }
    }

    fn write_eyes(&self, eyes: &EyesState) {
        let layout = self.raw();
        unsafe {
            store_side(&raw mut (*layout).eyes.right, &eyes.right);
            store_side(&raw mut (*layout).eyes.left, &eyes.left);
        }
    }

    fn connected(&self) -> bool {
        unsafe { ptr::read_volatile(&raw const (*self.raw()).eyes.connected) != 0 }
    }

    fn set_connected(&self, connected: bool) {
        unsafe { ptr::write_volatile(&raw mut (*self.raw()).eyes.connected, connected as i32) }
    }

    fn send_command(&self) -> bool {
        unsafe { ptr::read_volatile(&raw const (*self.raw()).eyes.send_command) != 0 }
    }

    fn set_send_command(&self, pending: bool) {
        unsafe { ptr::write_volatile(&raw mut (*self.raw()).eyes.send_command, pending as i32) }
    }

    fn lock_bus(&self) -> Result<(), ShmError> {
        loop {
            if unsafe { libc::sem_wait(self.sema()) } == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(ShmError::Semaphore(err));
            }
        }
    }

    fn unlock_bus(&self) {
        if unsafe { libc::sem_post(self.sema()) } != 0 {
            warn!("sem_post on bus mutex failed: {}", io::Error::last_os_error());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BusGuard;
    use std::io::Write;

    #[test]
    fn test_layout_matches_c_struct() {
        // 14 个 int 字段紧随 sem_t
        assert_eq!(std::mem::size_of::<RawEyes>(), 14 * 4);
        assert_eq!(std::mem::offset_of!(SegmentLayout, bus_sema), 8);
        // 眼球块紧跟在信号量之后，而不是位于信号量之前
        assert_eq!(
            std::mem::offset_of!(SegmentLayout, eyes),
            8 + std::mem::size_of::<libc::sem_t>()
        );
    }

    #[test]
    fn test_create_then_attach() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("simctl_eyes");

        let first = ShmSegment::open_or_create(&path).unwrap();
        assert!(first.created());
        assert_eq!(first.read_eyes(), EyesState::default());

        let mut eyes = EyesState::default();
        eyes.right.pupil = 40;
        eyes.left.position = 7;
        first.write_eyes(&eyes);
        first.set_send_command(true);

        let second = ShmSegment::open_or_create(&path).unwrap();
        assert!(!second.created());
        assert_eq!(second.read_eyes(), eyes);
        assert!(second.send_command());

        second.set_connected(true);
        assert!(first.connected());
    }

    #[test]
    fn test_bus_semaphore_shared_between_mappings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("simctl_eyes");
        let a = ShmSegment::open_or_create(&path).unwrap();
        let b = ShmSegment::open_or_create(&path).unwrap();

        let guard = BusGuard::acquire(&a).unwrap();
        let mut value = 0;
        unsafe { libc::sem_getvalue(b.sema(), &mut value) };
        assert_eq!(value, 0);

        drop(guard);
        unsafe { libc::sem_getvalue(b.sema(), &mut value) };
        assert_eq!(value, 1);
    }

    #[test]
    fn test_rejects_short_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short");
        std::fs::write(&path, [0u8; 4]).unwrap();

        match ShmSegment::open_or_create(&path) {
            Err(ShmError::TooSmall { required, actual }) => {
                assert_eq!(required, ShmSegment::layout_size());
                assert_eq!(actual, 4);
            },
            other => panic!("Expected TooSmall, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_foreign_segment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foreign");
        std::fs::write(&path, vec![0xFFu8; ShmSegment::layout_size()]).unwrap();

        assert!(matches!(
            ShmSegment::open_or_create(&path),
            Err(ShmError::BadMagic(0xFFFF_FFFF))
        ));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v2");
        let mut file = File::create(&path).unwrap();
        let mut bytes = vec![0u8; ShmSegment::layout_size()];
        bytes[0..4].copy_from_slice(&SEGMENT_MAGIC.to_ne_bytes());
        bytes[4..8].copy_from_slice(&2u32.to_ne_bytes());
        file.write_all(&bytes).unwrap();
        drop(file);

        assert!(matches!(
            ShmSegment::open_or_create(&path),
            Err(ShmError::BadVersion(2))
        ));
    }
}
