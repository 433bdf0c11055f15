//! Event sink that renders synchronization events as log records

use std::path::Path;

use tracing::{error, info};

use treemirror_core::{EventSink, Settings};

/// Logs every event through `tracing`; the subscriber decides where it lands
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

fn name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

fn folder(path: &Path) -> String {
    path.parent()
        .map_or_else(String::new, |p| p.display().to_string())
}

impl EventSink for TracingSink {
    fn file_up_to_date(&self, source: &Path, replica: &Path) {
        info!(
            "{:?} file from source {:?} does not need change in replica {:?}.",
            name(source),
            folder(source),
            folder(replica)
        );
    }

    fn file_copied(&self, source: &Path, replica: &Path) {
        info!(
            "{:?} file from source {:?} has been copied to replica {:?}.",
            name(source),
            folder(source),
            folder(replica)
        );
    }

    fn file_updated(&self, source: &Path, replica: &Path) {
        info!(
            "{:?} file from source {:?} has been updated in replica {:?}.",
            name(source),
            folder(source),
            folder(replica)
        );
    }

    fn file_deleted(&self, source: &Path, replica: &Path) {
        info!(
            "{:?} file has been deleted from replica {:?}, because it does not exist in source {:?}.",
            name(replica),
            folder(replica),
            folder(source)
        );
    }

    fn directory_copied(&self, source: &Path, replica: &Path) {
        info!(
            "Folder {:?} from source was copied to replica {:?}.",
            source.display().to_string(),
            folder(replica)
        );
    }

    fn directory_deleted(&self, source: &Path, replica: &Path) {
        info!(
            "Deleted folder {:?} from replica, it does not exist in source {:?}.",
            replica.display().to_string(),
            folder(source)
        );
    }

    fn entry_replaced(&self, source: &Path, replica: &Path) {
        info!(
            "{:?} in replica {:?} had the wrong type and was replaced from source {:?}.",
            name(replica),
            folder(replica),
            folder(source)
        );
    }

    fn sync_started(&self, settings: &Settings) {
        info!(
            "Starting synchronization with parameters:\n    source - {:?};\n    replica - {:?};\n    log-file - {:?};\n    interval - {} sec;\n    jobs - {}.\n\nCtrl+C to exit.",
            settings.source.display().to_string(),
            settings.replica.display().to_string(),
            settings.log_file.display().to_string(),
            settings.interval.as_secs(),
            settings.jobs
        );
    }

    fn folder_created(&self, path: &Path) {
        info!("{:?} was created.", path.display().to_string());
    }

    fn terminated_manually(&self) {
        info!("Terminated manually!");
    }

    fn error(&self, message: &str) {
        error!("{message}");
    }
}
