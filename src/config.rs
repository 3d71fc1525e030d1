use std::time::Duration;

/// 上传文件大小上限 10 MB
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// multipart 边界与字段头的额外空间
pub const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub const DEFAULT_FILES_DIR: &str = "/sandbox/files";

pub const DEFAULT_EXEC_TIMEOUT: u64 = 30;

pub const MAX_EXEC_TIMEOUT: u64 = 300;

/// SIGTERM 与 SIGKILL 之间的等待时间
pub const TERMINATION_GRACE: Duration = Duration::from_millis(100);

pub const DEFAULT_UNIT_PORT: u16 = 5858;

pub const DEFAULT_UNIT_IMAGE: &str = "kimitest2.azurecr.io/sandbox-image:latest";

pub const UNIT_NAME_PREFIX: &str = "sandbox-pod-";

/// CPU / 内存使用率阈值（百分比）
pub const ADMISSION_THRESHOLD: f64 = 80.0;

pub const PROVISION_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub const PROVISION_POLL_ATTEMPTS: u32 = 60;

pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(330);
