// Qt runtime locator/installer.
//
//   target      — platform detection
//   paths       — candidate roots and search scope
//   version     — `version.txt` marker
//   layout      — `{root}/qt/*` directory checks
//   environment — QT_PLUGIN_PATH / QML2_IMPORT_PATH / PATH shim
//   preload     — `preload.txt` native library preloading
//   configure   — validate + export + preload
//   source      — URL building and HTTP transfer
//   extract     — tar.gz unpacking
//   download    — spool, hash, extract
//   install     — staging + atomic rename
//   manager     — facade used by hosts and the CLI

pub mod configure;
pub mod detached;
pub mod download;
pub mod environment;
pub mod extract;
pub mod install;
pub mod layout;
pub mod locate;
pub mod manager;
pub mod paths;
pub mod preload;
pub mod source;
pub mod target;
pub mod version;

pub use download::DownloadReport;
pub use environment::{Environment, MemoryEnvironment, ProcessEnvironment};
pub use install::{InstallReceipt, Installation};
pub use layout::ConfiguredRuntime;
pub use locate::InstalledRuntime;
pub use manager::{RuntimeDiagnostic, RuntimeManager};
pub use paths::{SearchRoots, SearchScope};
pub use preload::{LibraryLoader, NativeLibraryLoader};
pub use target::RuntimeTarget;
pub use version::RuntimeVersion;
