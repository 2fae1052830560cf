//! Project an object-store instance into a local directory.
//!
//! ```text
//! cargo run --example project_store -- <instance-path> <virtual-root>
//! ```
//!
//! The logical filesystem here is a minimal host that exposes the store's
//! own namespaces; a real embedding supplies chats, invites, and the other
//! dynamic mounts.

#[cfg(target_os = "windows")]
mod run {
    use std::sync::Arc;

    use async_trait::async_trait;
    use castfs_projfs::{
        DirChild, FileEntry, LogicalFilesystem, ProjFsOptions, ProjFsProvider, StatInfo, VfsError,
        VfsResult,
    };

    /// Host exposing only the object namespace.
    struct StoreOnlyHost;

    #[async_trait]
    impl LogicalFilesystem for StoreOnlyHost {
        async fn stat(&self, vpath: &str) -> VfsResult<StatInfo> {
            match vpath {
                "/" | "/objects" => Ok(StatInfo {
                    size: 0,
                    is_directory: Some(true),
                    mode: 0o040555,
                    hash: None,
                }),
                _ => Err(VfsError::NotFound(vpath.to_string())),
            }
        }

        async fn read_dir(&self, vpath: &str) -> VfsResult<Vec<DirChild>> {
            match vpath {
                "/" => Ok(vec![DirChild::Entry(FileEntry::directory("objects"))]),
                _ => Err(VfsError::NotFound(vpath.to_string())),
            }
        }

        async fn read_file(&self, vpath: &str) -> VfsResult<Vec<u8>> {
            Err(VfsError::NotFound(vpath.to_string()))
        }
    }

    pub fn main() {
        let mut args = std::env::args().skip(1);
        let (instance_path, virtual_root) = match (args.next(), args.next()) {
            (Some(instance), Some(root)) => (instance, root),
            _ => {
                eprintln!("usage: project_store <instance-path> <virtual-root>");
                std::process::exit(1);
            }
        };

        let options = ProjFsOptions::new(virtual_root.into(), instance_path.into());
        let provider =
            ProjFsProvider::new(Arc::new(StoreOnlyHost), options).expect("create provider");

        provider.start().unwrap_or_else(|e| {
            eprintln!(
                "failed to start projection: {e} ({})",
                provider.last_error().unwrap_or_default()
            );
            std::process::exit(1);
        });

        println!("projection running; press Enter to stop");
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);

        provider.stop();
        println!("stats: {:?}", provider.stats());
    }
}

#[cfg(target_os = "windows")]
fn main() {
    run::main();
}

#[cfg(not(target_os = "windows"))]
fn main() {
    eprintln!("ProjFS projection requires Windows 10 1809 or later");
}
