use std::{
	io::ErrorKind,
	path::{Path, PathBuf},
	time::SystemTime,
};

use time::{Date, OffsetDateTime};
use tokio::{fs, io::AsyncWriteExt};

use crate::{BoxFuture, Error, Result};

/// A stored file as seen by directory enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
	pub name: String,
	pub size_bytes: u64,
	pub modified: Date,
	pub created: Date,
}

/// Byte storage for uploaded files, keyed by sanitized filename.
pub trait FileStore
where
	Self: Send + Sync,
{
	/// Regular files only, sorted by name.
	fn list(&self) -> BoxFuture<'_, Result<Vec<StoredFile>>>;

	fn stat<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<StoredFile>>>;

	/// Fails with [`Error::Conflict`] when the name is taken.
	fn write_new<'a>(&'a self, name: &'a str, bytes: &'a [u8]) -> BoxFuture<'a, Result<StoredFile>>;

	fn read<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Vec<u8>>>;

	/// Returns `false` when the file did not exist.
	fn remove<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<bool>>;
}

pub struct LocalFileStore {
	root: PathBuf,
}
impl LocalFileStore {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub async fn ensure_root(&self) -> Result<()> {
		fs::create_dir_all(&self.root).await?;

		Ok(())
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	fn path_for(&self, name: &str) -> Result<PathBuf> {
		if name.is_empty()
			|| name == "."
			|| name == ".."
			|| name.contains(['/', '\\'])
			|| name.contains('\0')
		{
			return Err(Error::InvalidArgument(format!("Filename {name:?} is not a plain name.")));
		}

		Ok(self.root.join(name))
	}

	async fn stat_path(name: &str, path: &Path) -> Result<Option<StoredFile>> {
		let meta = match fs::metadata(path).await {
			Ok(meta) => meta,
			Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
			Err(err) => return Err(err.into()),
		};

		if !meta.is_file() {
			return Ok(None);
		}

		let modified = meta.modified().map(to_date).unwrap_or_else(|_| today());
		// Not every filesystem records birth time.
		let created = meta.created().map(to_date).unwrap_or(modified);

		Ok(Some(StoredFile { name: name.to_string(), size_bytes: meta.len(), modified, created }))
	}
}
impl FileStore for LocalFileStore {
	fn list(&self) -> BoxFuture<'_, Result<Vec<StoredFile>>> {
		Box::pin(async move {
			let mut entries = match fs::read_dir(&self.root).await {
				Ok(entries) => entries,
				Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
				Err(err) => return Err(err.into()),
			};
			let mut out = Vec::new();

			while let Some(entry) = entries.next_entry().await? {
				let Ok(name) = entry.file_name().into_string() else {
					tracing::warn!(path = %entry.path().display(), "Skipping non UTF-8 filename.");

					continue;
				};

				if let Some(file) = Self::stat_path(&name, &entry.path()).await? {
					out.push(file);
				}
			}

			out.sort_by(|a, b| a.name.cmp(&b.name));

			Ok(out)
		})
	}

	fn stat<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<StoredFile>>> {
		Box::pin(async move {
			let path = self.path_for(name)?;

			Self::stat_path(name, &path).await
		})
	}

	fn write_new<'a>(&'a self, name: &'a str, bytes: &'a [u8]) -> BoxFuture<'a, Result<StoredFile>> {
		Box::pin(async move {
			let path = self.path_for(name)?;
			let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(&path).await
			{
				Ok(file) => file,
				Err(err) if err.kind() == ErrorKind::AlreadyExists =>
					return Err(Error::Conflict(format!("File {name} already exists."))),
				Err(err) => return Err(err.into()),
			};

			file.write_all(bytes).await?;
			file.flush().await?;

			Self::stat_path(name, &path)
				.await?
				.ok_or_else(|| Error::NotFound(format!("File {name} vanished after write.")))
		})
	}

	fn read<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
		Box::pin(async move {
			let path = self.path_for(name)?;

			match fs::read(&path).await {
				Ok(bytes) => Ok(bytes),
				Err(err) if err.kind() == ErrorKind::NotFound =>
					Err(Error::NotFound(format!("File {name} does not exist."))),
				Err(err) => Err(err.into()),
			}
		})
	}

	fn remove<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let path = self.path_for(name)?;

			match fs::remove_file(&path).await {
				Ok(()) => Ok(true),
				Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
				Err(err) => Err(err.into()),
			}
		})
	}
}

fn to_date(at: SystemTime) -> Date {
	OffsetDateTime::from(at).date()
}

fn today() -> Date {
	OffsetDateTime::now_utc().date()
}
