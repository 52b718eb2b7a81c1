use std::collections::HashSet;
use std::io::{self, Read, Seek, Write};
use std::path::Path;

use tracing::{debug, info};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use mist_db::{MistDb, MistError, MistResult, TableStore};
use mist_txn::{Transaction, TransactionDocument, TxnError};
use mist_types::Digest;

use crate::config::ArchiveConfig;
use crate::error::{ArchiveError, ArchiveResult};
use crate::layout::{content_entry, parse_transaction_entry, transaction_entry};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackupSummary {
    pub transactions: usize,
    pub blobs: usize,
}

/// Writes a database's history to a zip bundle and replays one back.
///
/// Backups take the store lock once per transaction read, never for the
/// whole run. The set of transactions is fixed when the backup starts; later
/// commits are left for the next backup.
pub struct Archiver<'a, S: TableStore> {
    db: &'a MistDb<S>,
    config: ArchiveConfig,
}

impl<'a, S: TableStore> Archiver<'a, S> {
    pub fn new(db: &'a MistDb<S>, config: ArchiveConfig) -> Self {
        Self { db, config }
    }

    /// Stream every committed transaction into `writer`, one at a time, in
    /// version order. Each blob is written once, by the first transaction
    /// that carries it.
    pub async fn backup<W: Write + Seek>(&self, writer: W) -> ArchiveResult<(W, BackupSummary)> {
        let versions: Vec<_> = self.db.list_transactions().await?.into_keys().collect();
        let options =
            SimpleFileOptions::default().compression_method(self.config.compression.method());
        let mut zip = ZipWriter::new(writer);
        let mut written: HashSet<Digest> = HashSet::new();
        let mut summary = BackupSummary::default();

        for version in versions {
            let txn = self.db.get_transaction(version).await?;
            let doc = TransactionDocument::from_transaction(&txn, |hash| Some(content_entry(hash)))
                .map_err(MistError::from)?;
            let json = doc.to_canonical_json().map_err(MistError::from)?;

            zip.start_file(transaction_entry(version), options)?;
            zip.write_all(json.as_bytes())?;
            for (hash, blob) in &txn.content {
                if written.insert(*hash) {
                    zip.start_file(content_entry(hash), options)?;
                    zip.write_all(blob)?;
                    summary.blobs += 1;
                }
            }
            summary.transactions += 1;
            debug!(%version, blobs = txn.content.len(), "archived transaction");
        }

        let writer = zip.finish()?;
        info!(
            transactions = summary.transactions,
            blobs = summary.blobs,
            "backup complete"
        );
        Ok((writer, summary))
    }

    /// Back up to a new file at `path`. The bundle is written beside it and
    /// moved into place only once complete; an existing file is never
    /// replaced.
    pub async fn backup_to_path(&self, path: &Path) -> ArchiveResult<BackupSummary> {
        if path.exists() {
            return Err(ArchiveError::Exists(path.to_path_buf()));
        }
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let temp = tempfile::NamedTempFile::new_in(dir)?;
        let (temp, summary) = self.backup(temp).await?;
        temp.as_file().sync_all()?;
        temp.persist_noclobber(path).map_err(|err| {
            if err.error.kind() == io::ErrorKind::AlreadyExists {
                ArchiveError::Exists(path.to_path_buf())
            } else {
                ArchiveError::Io(err.error)
            }
        })?;
        Ok(summary)
    }

    /// Replay a bundle into the database, which must be empty. Every document
    /// is re-hashed and re-validated; the first failure rolls back the whole
    /// restore.
    pub async fn restore<R: Read + Seek>(&self, reader: R) -> ArchiveResult<usize> {
        let mut archive = ZipArchive::new(reader)?;
        let mut entries: Vec<_> = archive
            .file_names()
            .filter_map(|name| parse_transaction_entry(name).map(|v| (v, name.to_string())))
            .collect();
        entries.sort();
        debug!(entries = entries.len(), "restoring bundle");

        let limit = self.config.max_entry_size;
        let txns = entries
            .into_iter()
            .map(|(_, name)| read_transaction(&mut archive, &name, limit));
        let restored = self.db.restore(txns).await?;
        Ok(restored)
    }

    pub async fn restore_from_path(&self, path: &Path) -> ArchiveResult<usize> {
        let file = std::fs::File::open(path)?;
        self.restore(io::BufReader::new(file)).await
    }
}

fn read_transaction<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
    limit: u64,
) -> MistResult<Transaction> {
    let bytes = read_entry(archive, name, limit).map_err(|err| match err {
        ZipError::FileNotFound => MistError::NotFound(format!("archive entry {name}")),
        other => MistError::Serialization(format!("{name}: {other}")),
    })?;
    let text = String::from_utf8(bytes)
        .map_err(|_| MistError::Serialization(format!("{name} is not valid UTF-8")))?;
    let doc = TransactionDocument::from_json(&text)?;
    if !doc.verify_hash()? {
        return Err(MistError::HashMismatch(format!(
            "{name}: body does not hash to {}",
            doc.id
        )));
    }

    let txn = doc.into_transaction(|hash, reference| {
        let entry = reference
            .map(str::to_owned)
            .unwrap_or_else(|| content_entry(hash));
        read_entry(archive, &entry, limit).map_err(|err| match err {
            ZipError::FileNotFound => TxnError::MissingContent(*hash),
            other => TxnError::Serialization(format!("{entry}: {other}")),
        })
    })?;
    Ok(txn)
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
    limit: u64,
) -> Result<Vec<u8>, ZipError> {
    let file = archive.by_name(name)?;
    let mut buf = Vec::new();
    file.take(limit.saturating_add(1)).read_to_end(&mut buf)?;
    if buf.len() as u64 > limit {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("entry exceeds {limit} bytes"),
        )
        .into());
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use mist_db::{InMemoryTableStore, MistConfig, ObjectPatch, TransactionBuilder};
    use mist_types::{Attributes, Value, Version};

    use crate::config::Compression;

    fn db() -> MistDb<InMemoryTableStore> {
        MistDb::in_memory(MistConfig::default())
    }

    async fn populate(db: &MistDb<InMemoryTableStore>) {
        let mut b = TransactionBuilder::new().with_user("alice");
        let logo = b.new_content(b"logo".to_vec());
        let docs = b.new_object(None, "docs", None, None, Attributes::new()).unwrap();
        let mut attrs = Attributes::new();
        attrs.insert("tags".into(), Value::from(vec!["brand"]));
        let readme = b
            .new_object(Some(docs.id), "logo.png", Some(logo), Some("image/png".into()), attrs)
            .unwrap();
        db.submit(b).await.unwrap();

        let mut b = TransactionBuilder::new();
        let again = b.new_content(b"logo".to_vec());
        b.new_object(Some(docs.id), "copy.png", Some(again), None, Attributes::new())
            .unwrap();
        b.modify_object(&readme, ObjectPatch::new().path_elem("brand.png")).unwrap();
        db.submit(b).await.unwrap();

        let mut b = TransactionBuilder::new();
        let scratch = b.new_object(None, "scratch", None, None, Attributes::new()).unwrap();
        db.submit(b).await.unwrap();
        let mut b = TransactionBuilder::new();
        b.delete_object(scratch.id).unwrap();
        db.submit(b).await.unwrap();
    }

    async fn bundle(db: &MistDb<InMemoryTableStore>, config: ArchiveConfig) -> Vec<u8> {
        let (cursor, _) = Archiver::new(db, config)
            .backup(Cursor::new(Vec::new()))
            .await
            .unwrap();
        cursor.into_inner()
    }

    /// Copy a bundle, letting `edit` replace or drop (`None`) entries.
    fn rewrite(bytes: &[u8], mut edit: impl FnMut(&str, Vec<u8>) -> Option<Vec<u8>>) -> Vec<u8> {
        let mut source = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut out = ZipWriter::new(Cursor::new(Vec::new()));
        for i in 0..source.len() {
            let mut file = source.by_index(i).unwrap();
            let name = file.name().to_string();
            let mut data = Vec::new();
            file.read_to_end(&mut data).unwrap();
            if let Some(data) = edit(&name, data) {
                out.start_file(name, SimpleFileOptions::default()).unwrap();
                out.write_all(&data).unwrap();
            }
        }
        out.finish().unwrap().into_inner()
    }

    #[tokio::test]
    async fn round_trip_reproduces_the_store() {
        let source = db();
        populate(&source).await;
        let bytes = bundle(&source, ArchiveConfig::default()).await;

        let target = db();
        let restored = Archiver::new(&target, ArchiveConfig::default())
            .restore(Cursor::new(bytes))
            .await
            .unwrap();
        assert_eq!(restored, 4);
        assert_eq!(
            target.list_transactions().await.unwrap(),
            source.list_transactions().await.unwrap()
        );
        assert!(target.verify(None).await.unwrap().is_clean());

        let source = source.into_store();
        let target = target.into_store();
        assert_eq!(target.tables().objects(), source.tables().objects());
        assert_eq!(target.tables().attributes(), source.tables().attributes());
        assert_eq!(target.tables().contents(), source.tables().contents());
    }

    #[tokio::test]
    async fn round_trip_preserves_forks_and_merges() {
        let left = db();
        let right = db();
        populate(&left).await;
        for version in [2, 4, 6, 8] {
            let txn = left.get_transaction(Version(version)).await.unwrap();
            right.import_transaction(txn).await.unwrap();
        }

        let mut b = TransactionBuilder::new().with_user("alice");
        let notes = b.new_content(b"notes".to_vec());
        b.new_object(None, "notes.txt", Some(notes), None, Attributes::new()).unwrap();
        left.submit(b).await.unwrap();
        let mut b = TransactionBuilder::new().with_user("bob");
        b.new_object(None, "inbox", None, None, Attributes::new()).unwrap();
        let from_right = right.submit(b).await.unwrap();
        left.import_transaction(from_right).await.unwrap();
        assert_eq!(left.heads().await.unwrap().len(), 2);
        let merge = left.submit(TransactionBuilder::new()).await.unwrap();
        assert_eq!(merge.parents.as_ref().map(|p| p.len()), Some(2));

        let bytes = bundle(&left, ArchiveConfig::default()).await;
        let target = db();
        let restored = Archiver::new(&target, ArchiveConfig::default())
            .restore(Cursor::new(bytes))
            .await
            .unwrap();
        assert_eq!(restored, 7);

        let listed = target.list_transactions().await.unwrap();
        assert_eq!(listed, left.list_transactions().await.unwrap());
        assert_eq!(listed[&Version(14)].parents.len(), 2);
        let heads = target.heads().await.unwrap();
        assert_eq!(heads.len(), 1);
        assert_eq!(Some(heads[0].hash), merge.hash);
        assert!(target.verify(None).await.unwrap().is_clean());

        let source = left.into_store();
        let target = target.into_store();
        assert_eq!(target.tables().objects(), source.tables().objects());
        assert_eq!(target.tables().attributes(), source.tables().attributes());
        assert_eq!(target.tables().contents(), source.tables().contents());
    }

    #[tokio::test]
    async fn bundle_holds_one_entry_per_transaction_and_blob() {
        let source = db();
        populate(&source).await;
        let bytes = bundle(
            &source,
            ArchiveConfig {
                compression: Compression::Stored,
                ..Default::default()
            },
        )
        .await;

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names.len(), 5);
        assert_eq!(names[0].len(), "content/".len() + Digest::LEN * 2);
        assert_eq!(
            &names[1..],
            ["transaction_2.json", "transaction_4.json", "transaction_6.json", "transaction_8.json"]
        );

        let mut text = String::new();
        archive
            .by_name("transaction_2.json")
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["transaction"]["user"], "alice");
        let refs = doc["transaction"]["content"].as_object().unwrap();
        assert_eq!(refs.values().next().unwrap(), &serde_json::json!(names[0]));
    }

    #[tokio::test]
    async fn restore_requires_an_empty_target() {
        let source = db();
        populate(&source).await;
        let bytes = bundle(&source, ArchiveConfig::default()).await;

        let err = Archiver::new(&source, ArchiveConfig::default())
            .restore(Cursor::new(bytes))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(MistError::FILE_EXISTS));
    }

    #[tokio::test]
    async fn tampered_document_rejects_whole_restore() {
        let source = db();
        populate(&source).await;
        let bytes = rewrite(&bundle(&source, ArchiveConfig::default()).await, |name, data| {
            if name == "transaction_6.json" {
                let text = String::from_utf8(data).unwrap();
                Some(text.replace("\"scratch\"", "\"renamed\"").into_bytes())
            } else {
                Some(data)
            }
        });

        let target = db();
        let err = Archiver::new(&target, ArchiveConfig::default())
            .restore(Cursor::new(bytes))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(MistError::HASH_MISMATCH));
        assert!(target.list_transactions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let source = db();
        populate(&source).await;
        let bytes = rewrite(&bundle(&source, ArchiveConfig::default()).await, |name, data| {
            (!name.starts_with("content/")).then_some(data)
        });

        let target = db();
        let err = Archiver::new(&target, ArchiveConfig::default())
            .restore(Cursor::new(bytes))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(MistError::NOT_FOUND));
        assert!(target.list_transactions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_entry_is_rejected() {
        let source = db();
        populate(&source).await;
        let bytes = bundle(&source, ArchiveConfig::default()).await;

        let target = db();
        let err = Archiver::new(
            &target,
            ArchiveConfig {
                max_entry_size: 16,
                ..Default::default()
            },
        )
        .restore(Cursor::new(bytes))
        .await
        .unwrap_err();
        assert_eq!(err.code(), Some(MistError::SERIALIZATION));
    }

    #[tokio::test]
    async fn path_backup_never_overwrites() {
        let source = db();
        populate(&source).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.zip");
        let archiver = Archiver::new(&source, ArchiveConfig::default());

        let summary = archiver.backup_to_path(&path).await.unwrap();
        assert_eq!(summary, BackupSummary { transactions: 4, blobs: 1 });
        assert!(matches!(
            archiver.backup_to_path(&path).await,
            Err(ArchiveError::Exists(_))
        ));

        let target = db();
        let restored = Archiver::new(&target, ArchiveConfig::default())
            .restore_from_path(&path)
            .await
            .unwrap();
        assert_eq!(restored, 4);
    }

    #[tokio::test]
    async fn backup_tolerates_concurrent_commits() {
        let source = std::sync::Arc::new(db());
        populate(&source).await;

        let writer = {
            let source = std::sync::Arc::clone(&source);
            tokio::spawn(async move {
                for i in 0..20 {
                    let mut b = TransactionBuilder::new();
                    b.new_object(None, format!("late{i}"), None, None, Attributes::new())
                        .unwrap();
                    source.submit(b).await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };
        let bytes = bundle(&source, ArchiveConfig::default()).await;
        writer.await.unwrap();

        let target = db();
        let restored = Archiver::new(&target, ArchiveConfig::default())
            .restore(Cursor::new(bytes))
            .await
            .unwrap();
        assert!(restored >= 4 && restored <= 24);
        assert!(target.verify(None).await.unwrap().is_clean());
        let last = Version(2 * restored as u64);
        assert_eq!(
            target.get_transaction(last).await.unwrap().hash,
            source.get_transaction(last).await.unwrap().hash
        );
    }
}
