/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Local-file transport: every change of a watched JSON document becomes a response.
//!
//! The document has the shape of a [`DiscoveryResponse`]. When it carries no
//! `version_info`, one is derived as `<sequence>.<fingerprint>`: the sequence starts
//! at the file's modification time and moves strictly forward whenever the content
//! changes, even if a later edit carries an older timestamp. There is no authority
//! to answer, so ACK/NACK requests are recorded and go nowhere.

use crate::error::TransportError;
use crate::observability::events;
use crate::resource::{DiscoveryRequest, DiscoveryResponse, ResourceGroup, VersionInfo};
use crate::transport::{EventSender, TransportEvent};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::UNIX_EPOCH;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const COMPONENT: &str = "file_watch_transport";
const FINGERPRINT_HEX_LEN: usize = 16;

#[derive(Clone, Debug)]
pub struct FileWatchOptions {
    /// Register a filesystem watcher. When off, only [`FileChangeNotifier`] triggers reloads.
    pub watch_filesystem: bool,
}

impl Default for FileWatchOptions {
    fn default() -> Self {
        Self {
            watch_filesystem: true,
        }
    }
}

/// Manual change trigger for a [`FileWatchTransport`].
#[derive(Clone, Debug)]
pub struct FileChangeNotifier {
    changes: UnboundedSender<()>,
}

impl FileChangeNotifier {
    /// Requests a reload. Returns `false` once the transport is gone.
    pub fn notify(&self) -> bool {
        self.changes.send(()).is_ok()
    }
}

/// Read handle on the requests a [`FileWatchTransport`] has recorded.
#[derive(Clone, Debug, Default)]
pub struct RecordedRequests {
    inner: Arc<Mutex<Vec<DiscoveryRequest>>>,
}

impl RecordedRequests {
    fn record(&self, request: DiscoveryRequest) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn latest(&self) -> Option<DiscoveryRequest> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// The request recorded at position `index`, oldest first.
    pub fn get(&self, index: usize) -> Option<DiscoveryRequest> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .cloned()
    }
}

/// Versions for documents that do not state one.
///
/// Unchanged content keeps its version; changed content always gets a sequence
/// above the previous one.
#[derive(Debug, Default)]
pub(crate) struct DerivedVersions {
    last: Option<(u128, String)>,
}

impl DerivedVersions {
    pub(crate) fn derive(&mut self, modified_nanos: u128, contents: &[u8]) -> VersionInfo {
        let digest = hex::encode(Sha256::digest(contents));
        let fingerprint = &digest[..FINGERPRINT_HEX_LEN];

        let sequence = match &self.last {
            Some((sequence, previous)) if previous == fingerprint => *sequence,
            Some((sequence, _)) => modified_nanos.max(sequence + 1),
            None => modified_nanos,
        };
        self.last = Some((sequence, fingerprint.to_string()));
        VersionInfo::new(format!("{sequence}.{fingerprint}"))
    }
}

async fn load_document(
    path: &Path,
    group: &ResourceGroup,
    derived: &mut DerivedVersions,
) -> Result<DiscoveryResponse, TransportError> {
    let contents = tokio::fs::read(path).await?;
    let modified_nanos = tokio::fs::metadata(path)
        .await?
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|since| since.as_nanos())
        .unwrap_or_default();

    let mut response: DiscoveryResponse = serde_json::from_slice(&contents)
        .map_err(|err| TransportError::Malformed(format!("{}: {err}", path.display())))?;

    if response.version_info.is_empty() {
        response.version_info = derived.derive(modified_nanos, &contents);
    }
    if response.group.as_str().is_empty() {
        response.group = group.clone();
    }
    response.nonce = response.version_info.to_string();
    Ok(response)
}

async fn reload(
    path: &Path,
    group: &ResourceGroup,
    derived: &mut DerivedVersions,
    events: &EventSender,
) {
    match load_document(path, group, derived).await {
        Ok(response) => {
            debug!(
                event = events::FILE_READ_OK,
                component = COMPONENT,
                path = %path.display(),
                group = %response.group,
                version = %response.version_info,
                resources = response.resources.len(),
                "document loaded"
            );
            let _ = events.send(TransportEvent::Response(response));
        }
        Err(err) => {
            warn!(
                event = events::FILE_READ_FAILED,
                component = COMPONENT,
                path = %path.display(),
                err = %err,
                "unable to load document"
            );
            let _ = events.send(TransportEvent::Error(err));
        }
    }
}

async fn run_file_watch(
    path: PathBuf,
    group: ResourceGroup,
    mut changes: UnboundedReceiver<()>,
    events: EventSender,
) {
    let mut derived = DerivedVersions::default();
    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
        reload(&path, &group, &mut derived, &events).await;
    } else {
        debug!(
            event = events::FILE_ABSENT_AT_START,
            component = COMPONENT,
            path = %path.display(),
            "waiting for document to appear"
        );
    }

    while changes.recv().await.is_some() {
        // Editors emit bursts of events for one save.
        while changes.try_recv().is_ok() {}
        debug!(
            event = events::FILE_CHANGE_DETECTED,
            component = COMPONENT,
            path = %path.display(),
            "document changed"
        );
        reload(&path, &group, &mut derived, &events).await;
    }

    debug!(
        event = events::TRANSPORT_TASK_EXIT,
        component = COMPONENT,
        path = %path.display(),
        "file watch stopped"
    );
}

fn watch_parent(
    path: &Path,
    changes: UnboundedSender<()>,
) -> Result<RecommendedWatcher, TransportError> {
    let file_name = path.file_name().map(|name| name.to_os_string());
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
        let Ok(event) = result else {
            return;
        };
        // Removal reloads too, so a vanished document surfaces as a read failure.
        if !matches!(
            event.kind,
            EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
        ) {
            return;
        }
        let touches_document = event
            .paths
            .iter()
            .any(|changed| changed.file_name() == file_name.as_deref());
        if touches_document {
            let _ = changes.send(());
        }
    })
    .map_err(|err| TransportError::ConnectFailed(format!("file watch: {err}")))?;

    watcher
        .watch(&directory, RecursiveMode::NonRecursive)
        .map_err(|err| TransportError::ConnectFailed(format!("file watch: {err}")))?;
    Ok(watcher)
}

pub struct FileWatchTransport {
    path: PathBuf,
    options: FileWatchOptions,
    changes_tx: UnboundedSender<()>,
    changes_rx: Option<UnboundedReceiver<()>>,
    watcher: Option<RecommendedWatcher>,
    task: Option<JoinHandle<()>>,
    recorded: RecordedRequests,
}

impl FileWatchTransport {
    pub fn new(path: impl Into<PathBuf>, options: FileWatchOptions) -> Self {
        let (changes_tx, changes_rx) = mpsc::unbounded_channel();
        Self {
            path: path.into(),
            options,
            changes_tx,
            changes_rx: Some(changes_rx),
            watcher: None,
            task: None,
            recorded: RecordedRequests::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn notifier(&self) -> FileChangeNotifier {
        FileChangeNotifier {
            changes: self.changes_tx.clone(),
        }
    }

    /// The most recent request recorded by this transport.
    pub fn last_request(&self) -> Option<DiscoveryRequest> {
        self.recorded.latest()
    }

    /// Every request this transport has recorded; stays valid after the transport
    /// has been handed to a subscription.
    pub fn recorded_requests(&self) -> RecordedRequests {
        self.recorded.clone()
    }

    pub(crate) fn start(
        &mut self,
        group: &ResourceGroup,
        events: EventSender,
    ) -> Result<(), TransportError> {
        let changes = self.changes_rx.take().ok_or_else(|| {
            TransportError::ConnectFailed("file watch transport already started".to_string())
        })?;

        if self.options.watch_filesystem {
            match watch_parent(&self.path, self.changes_tx.clone()) {
                Ok(watcher) => self.watcher = Some(watcher),
                Err(err) => {
                    warn!(
                        event = events::FILE_WATCH_START_FAILED,
                        component = COMPONENT,
                        path = %self.path.display(),
                        err = %err,
                        "unable to watch document"
                    );
                    // Stays startable so the caller can retry.
                    self.changes_rx = Some(changes);
                    return Err(err);
                }
            }
        }

        info!(
            event = events::SUBSCRIPTION_START,
            component = COMPONENT,
            path = %self.path.display(),
            group = %group,
            watch_filesystem = self.options.watch_filesystem,
            "watching document"
        );
        self.task = Some(tokio::spawn(run_file_watch(
            self.path.clone(),
            group.clone(),
            changes,
            events,
        )));
        Ok(())
    }

    pub(crate) fn send(&self, request: DiscoveryRequest) -> Result<(), TransportError> {
        self.recorded.record(request);
        Ok(())
    }

    pub(crate) fn close(&mut self) {
        self.watcher.take();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for FileWatchTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::{DerivedVersions, FileWatchOptions, FileWatchTransport};
    use crate::error::TransportError;
    use crate::resource::ResourceGroup;
    use crate::transport::TransportEvent;
    use tokio::sync::mpsc;

    fn manual() -> FileWatchOptions {
        FileWatchOptions {
            watch_filesystem: false,
        }
    }

    #[test]
    fn derived_version_changes_with_content() {
        let mut derived = DerivedVersions::default();
        let first = derived.derive(42, b"{}");
        let second = derived.derive(42, b"{\"resources\": []}");

        assert_ne!(first, second);
        assert!(first.as_str().starts_with("42."));
        assert_eq!(first.as_str().len(), "42.".len() + 16);
        assert!(first.predates(&second));
    }

    #[test]
    fn derived_version_moves_forward_when_mtime_goes_back() {
        let mut derived = DerivedVersions::default();
        let first = derived.derive(1_000, b"{\"resources\": []}");
        let restored = derived.derive(10, b"{}");

        assert!(first.predates(&restored), "{first} then {restored}");
        assert!(restored.as_str().starts_with("1001."));
    }

    #[test]
    fn unchanged_content_keeps_its_derived_version() {
        let mut derived = DerivedVersions::default();
        let first = derived.derive(5, b"{}");

        assert_eq!(derived.derive(9, b"{}"), first);
    }

    #[tokio::test]
    async fn failed_watch_leaves_transport_startable() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("not-yet");
        let mut transport =
            FileWatchTransport::new(parent.join("clusters.json"), FileWatchOptions::default());
        let (events_tx, _events_rx) = mpsc::unbounded_channel();

        assert!(transport
            .start(&ResourceGroup::from("clusters"), events_tx.clone())
            .is_err());

        std::fs::create_dir_all(&parent).unwrap();
        assert!(transport
            .start(&ResourceGroup::from("clusters"), events_tx)
            .is_ok());
    }

    #[tokio::test]
    async fn existing_document_is_delivered_on_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clusters.json");
        std::fs::write(
            &path,
            r#"{"version_info": "7", "resources": [{"name": "cluster0", "body": {}}]}"#,
        )
        .unwrap();

        let mut transport = FileWatchTransport::new(&path, manual());
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        transport
            .start(&ResourceGroup::from("clusters"), events_tx)
            .unwrap();

        match events_rx.recv().await {
            Some(TransportEvent::Response(response)) => {
                assert_eq!(response.version_info.as_str(), "7");
                assert_eq!(response.nonce, "7");
                assert_eq!(response.group.as_str(), "clusters");
                assert_eq!(response.resources[0].name, "cluster0");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_document_waits_then_loads_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.json");
        let mut transport = FileWatchTransport::new(&path, manual());
        let notifier = transport.notifier();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        transport
            .start(&ResourceGroup::from("routes"), events_tx)
            .unwrap();

        tokio::task::yield_now().await;
        assert!(events_rx.try_recv().is_err());

        std::fs::write(&path, r#"{"resources": []}"#).unwrap();
        assert!(notifier.notify());

        match events_rx.recv().await {
            Some(TransportEvent::Response(response)) => {
                assert!(!response.version_info.is_empty());
                assert_eq!(response.nonce, response.version_info.as_str());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn unparsable_document_reports_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clusters.json");
        std::fs::write(&path, "{ not json").unwrap();

        let mut transport = FileWatchTransport::new(&path, manual());
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        transport
            .start(&ResourceGroup::from("clusters"), events_tx)
            .unwrap();

        assert!(matches!(
            events_rx.recv().await,
            Some(TransportEvent::Error(TransportError::Malformed(_)))
        ));
    }

    #[test]
    fn acknowledgements_are_recorded_locally() {
        let transport = FileWatchTransport::new("unused.json", manual());
        let request = crate::resource::DiscoveryRequest::new(
            ResourceGroup::from("clusters"),
            None,
            &Default::default(),
        )
        .with_nonce("1");

        let recorded = transport.recorded_requests();
        transport.send(request.clone()).unwrap();

        assert_eq!(transport.last_request(), Some(request));
        assert_eq!(recorded.len(), 1);
    }

    #[tokio::test]
    async fn second_start_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut transport = FileWatchTransport::new(dir.path().join("x.json"), manual());
        let (events_tx, _events_rx) = mpsc::unbounded_channel();

        assert!(transport
            .start(&ResourceGroup::from("clusters"), events_tx.clone())
            .is_ok());
        assert!(transport
            .start(&ResourceGroup::from("clusters"), events_tx)
            .is_err());
    }
}
