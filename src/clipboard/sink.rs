//! Clipboard collaborators
//!
//! The transfer core only sees ordered lists of (type tag, bytes). These traits
//! are the seam to whatever actually owns the clipboard:
//!
//! - [`ClipboardSink`] receives completed payloads keyed by sender
//! - [`ClipboardSource`] supplies the items to send
//!
//! Two sinks ship with the crate: [`SpoolClipboard`] writes each payload to a
//! directory (used by the CLI), [`ChannelSink`] forwards payloads over a tokio
//! channel for embedding applications.

use crate::clipboard::error::{ClipboardError, Result};
use crate::clipboard::payload::{Item, Payload};
use crate::discovery::PeerId;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Receives payloads completed by inbound transfers
#[cfg_attr(test, mockall::automock)]
pub trait ClipboardSink {
    /// Hand over everything received from `peer` in one transfer
    fn deliver(&mut self, peer: &PeerId, payload: Payload) -> Result<()>;
}

/// Supplies the items of an outbound payload
pub trait ClipboardSource {
    /// Capture the current clipboard items
    fn read_items(&mut self) -> Result<Vec<Item>>;
}

/// Forwards payloads to a channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<(PeerId, Payload)>,
}

impl ChannelSink {
    /// Create a sink and the receiver it feeds
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(PeerId, Payload)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ClipboardSink for ChannelSink {
    fn deliver(&mut self, peer: &PeerId, payload: Payload) -> Result<()> {
        self.tx
            .send((peer.clone(), payload))
            .map_err(|_| ClipboardError::Backend("payload receiver dropped".to_string()))
    }
}

/// Manifest written next to spooled representations
#[derive(Debug, Serialize)]
struct SpoolManifest<'a> {
    peer: &'a str,
    digest: &'a str,
    received_at: String,
    items: Vec<Vec<SpoolEntry>>,
}

#[derive(Debug, Serialize)]
struct SpoolEntry {
    type_tag: String,
    file: String,
    size: usize,
}

/// Writes each received payload into its own directory:
///
/// ```text
/// <spool>/<timestamp>-<peer>-<digest>/
///   manifest.json
///   item-000/rep-00.bin
///   item-000/rep-01.bin
/// ```
#[derive(Debug, Clone)]
pub struct SpoolClipboard {
    dir: PathBuf,
}

impl SpoolClipboard {
    /// Spool into `dir`, creating it if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Spool directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn payload_dir(&self, peer: &PeerId, digest: &str) -> PathBuf {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S%.3f");
        let peer: String = peer
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir
            .join(format!("{}-{}-{}", stamp, peer, &digest[..digest.len().min(12)]))
    }
}

impl ClipboardSink for SpoolClipboard {
    fn deliver(&mut self, peer: &PeerId, payload: Payload) -> Result<()> {
        let digest = payload.digest();
        let target = self.payload_dir(peer, &digest);
        std::fs::create_dir_all(&target)?;

        let mut items = Vec::with_capacity(payload.len());
        for (i, item) in payload.items().iter().enumerate() {
            let item_dir = format!("item-{:03}", i);
            std::fs::create_dir_all(target.join(&item_dir))?;

            let mut entries = Vec::with_capacity(item.representations().len());
            for (j, rep) in item.representations().iter().enumerate() {
                let file = format!("{}/rep-{:02}.bin", item_dir, j);
                std::fs::write(target.join(&file), &rep.data)?;
                entries.push(SpoolEntry {
                    type_tag: rep.type_tag.clone(),
                    file,
                    size: rep.data.len(),
                });
            }
            items.push(entries);
        }

        let manifest = SpoolManifest {
            peer: peer.as_str(),
            digest: &digest,
            received_at: chrono::Local::now().to_rfc3339(),
            items,
        };
        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| ClipboardError::Backend(format!("manifest encoding failed: {}", e)))?;
        std::fs::write(target.join("manifest.json"), json)?;

        info!(
            "Spooled {} items from {} into {}",
            payload.len(),
            peer,
            target.display()
        );
        Ok(())
    }
}

/// Where a pending representation's bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceData {
    /// Inline text
    Text(String),
    /// File contents, read when the payload is captured
    File(PathBuf),
}

/// One item to capture: a type tag and where its data lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Type tag to send
    pub type_tag: String,
    /// Data origin
    pub data: SourceData,
}

/// Source built from command-line arguments; each entry becomes one item
#[derive(Debug, Clone, Default)]
pub struct ArgumentSource {
    entries: Vec<SourceEntry>,
}

impl ArgumentSource {
    /// Create from entries
    pub fn new(entries: Vec<SourceEntry>) -> Self {
        Self { entries }
    }

    /// Number of items this source will produce
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the source has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ClipboardSource for ArgumentSource {
    fn read_items(&mut self) -> Result<Vec<Item>> {
        self.entries
            .iter()
            .map(|entry| {
                let data = match &entry.data {
                    SourceData::Text(text) => text.clone().into_bytes(),
                    SourceData::File(path) => std::fs::read(path).map_err(|e| {
                        ClipboardError::SerializationFault(format!(
                            "{}: {}",
                            path.display(),
                            e
                        ))
                    })?,
                };
                debug!("Captured {} ({} bytes)", entry.type_tag, data.len());
                Ok(Item::single(entry.type_tag.clone(), data))
            })
            .collect()
    }
}
