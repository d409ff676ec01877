//! In-memory stand-ins for the storage seams, with switches for injecting failures.

use std::{
	collections::{BTreeMap, HashMap},
	io,
	sync::{
		Mutex, MutexGuard,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
};

use time::{Date, OffsetDateTime};
use uuid::Uuid;

use grimoire_domain::{
	file::{FileIndexDoc, FileMetadata},
	tags::TagSet,
};
use grimoire_storage::{
	BoxFuture, Error, Result,
	files::{FileStore, StoredFile},
	index::{FacetField, IndexQuery, ScoredDoc, SearchIndex, rank_hits},
	metadata::MetadataStore,
	models::{DirtyEntry, FavoriteEntry, MetadataFacets, NewUser, RecentEntry, UserRow},
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|err| err.into_inner())
}

#[derive(Debug, Clone)]
struct MetadataRow {
	meta: FileMetadata,
	dirty: bool,
	attempts: i32,
	error: Option<String>,
	available_at: OffsetDateTime,
}
impl MetadataRow {
	fn new(meta: FileMetadata) -> Self {
		Self {
			meta,
			dirty: false,
			attempts: 0,
			error: None,
			available_at: OffsetDateTime::UNIX_EPOCH,
		}
	}
}

#[derive(Debug, Clone)]
struct AccessRow {
	seq: u64,
	user_id: Uuid,
	filename: String,
	at: OffsetDateTime,
}

#[derive(Default)]
struct MetadataState {
	files: BTreeMap<String, MetadataRow>,
	users: BTreeMap<Uuid, UserRow>,
	favorites: BTreeMap<(Uuid, String), OffsetDateTime>,
	recents: Vec<AccessRow>,
	next_seq: u64,
}

/// [`MetadataStore`] backed by process memory.
#[derive(Default)]
pub struct MemoryMetadataStore {
	state: Mutex<MetadataState>,
	fail_writes: AtomicBool,
	fail_reads: AtomicBool,
}
impl MemoryMetadataStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Makes every file metadata write fail until switched back.
	pub fn set_fail_writes(&self, fail: bool) {
		self.fail_writes.store(fail, Ordering::SeqCst);
	}

	/// Makes file metadata lookups fail until switched back.
	pub fn set_fail_reads(&self, fail: bool) {
		self.fail_reads.store(fail, Ordering::SeqCst);
	}

	pub fn is_dirty(&self, filename: &str) -> bool {
		lock(&self.state).files.get(filename).is_some_and(|row| row.dirty)
	}

	pub fn sync_error(&self, filename: &str) -> Option<String> {
		lock(&self.state).files.get(filename).and_then(|row| row.error.clone())
	}

	pub fn recent_rows(&self, user_id: Uuid) -> usize {
		lock(&self.state).recents.iter().filter(|row| row.user_id == user_id).count()
	}

	fn check_writable(&self) -> Result<()> {
		if self.fail_writes.load(Ordering::SeqCst) {
			return Err(Error::Io(io::Error::other("Metadata store rejected the write.")));
		}

		Ok(())
	}

	fn check_readable(&self) -> Result<()> {
		if self.fail_reads.load(Ordering::SeqCst) {
			return Err(Error::Io(io::Error::other("Metadata store is unreachable.")));
		}

		Ok(())
	}

	fn upsert_file<F>(&self, filename: &str, update: F) -> Result<FileMetadata>
	where
		F: FnOnce(&mut FileMetadata),
	{
		self.check_writable()?;

		let mut state = lock(&self.state);
		let row = state
			.files
			.entry(filename.to_string())
			.or_insert_with(|| MetadataRow::new(FileMetadata::empty(filename)));

		update(&mut row.meta);

		Ok(row.meta.clone())
	}

	fn update_user<F>(&self, user_id: Uuid, update: F) -> Option<UserRow>
	where
		F: FnOnce(&mut UserRow),
	{
		let mut state = lock(&self.state);
		let user = state.users.get_mut(&user_id)?;

		update(user);

		user.updated_at = OffsetDateTime::now_utc();

		Some(user.clone())
	}
}
impl MetadataStore for MemoryMetadataStore {
	fn get_metadata<'a>(&'a self, filename: &'a str) -> BoxFuture<'a, Result<Option<FileMetadata>>> {
		Box::pin(async move {
			self.check_readable()?;

			Ok(lock(&self.state).files.get(filename).map(|row| row.meta.clone()))
		})
	}

	fn get_metadata_many<'a>(
		&'a self,
		filenames: &'a [String],
	) -> BoxFuture<'a, Result<Vec<FileMetadata>>> {
		Box::pin(async move {
			self.check_readable()?;

			let state = lock(&self.state);

			Ok(filenames
				.iter()
				.filter_map(|name| state.files.get(name).map(|row| row.meta.clone()))
				.collect())
		})
	}

	fn ensure_metadata<'a>(
		&'a self,
		filename: &'a str,
		owner: &'a str,
		department: &'a str,
	) -> BoxFuture<'a, Result<FileMetadata>> {
		Box::pin(async move {
			self.check_writable()?;

			let mut state = lock(&self.state);
			let row = state.files.entry(filename.to_string()).or_insert_with(|| {
				MetadataRow::new(FileMetadata {
					filename: filename.to_string(),
					tags: TagSet::new(),
					owner: owner.to_string(),
					department: department.to_string(),
				})
			});

			Ok(row.meta.clone())
		})
	}

	fn save_tags<'a>(
		&'a self,
		filename: &'a str,
		tags: &'a TagSet,
	) -> BoxFuture<'a, Result<FileMetadata>> {
		Box::pin(async move { self.upsert_file(filename, |meta| meta.tags = tags.clone()) })
	}

	fn save_identity<'a>(
		&'a self,
		filename: &'a str,
		owner: &'a str,
		department: &'a str,
	) -> BoxFuture<'a, Result<FileMetadata>> {
		Box::pin(async move {
			self.upsert_file(filename, |meta| {
				meta.owner = owner.to_string();
				meta.department = department.to_string();
			})
		})
	}

	fn delete_metadata<'a>(&'a self, filename: &'a str) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			self.check_writable()?;

			Ok(lock(&self.state).files.remove(filename).is_some())
		})
	}

	fn list_metadata_filenames(&self) -> BoxFuture<'_, Result<Vec<String>>> {
		Box::pin(async move { Ok(lock(&self.state).files.keys().cloned().collect()) })
	}

	fn prune_metadata<'a>(&'a self, keep: &'a [String]) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move {
			self.check_writable()?;

			let mut state = lock(&self.state);
			let before = state.files.len();

			state.files.retain(|name, _| keep.contains(name));

			Ok((before - state.files.len()) as u64)
		})
	}

	fn distinct_metadata_values(&self) -> BoxFuture<'_, Result<MetadataFacets>> {
		Box::pin(async move {
			let state = lock(&self.state);
			let mut facets = MetadataFacets::default();

			for row in state.files.values() {
				facets.tags.extend(row.meta.tags.iter().map(str::to_string));

				if !row.meta.owner.is_empty() {
					facets.owners.push(row.meta.owner.clone());
				}
				if !row.meta.department.is_empty() {
					facets.departments.push(row.meta.department.clone());
				}
			}

			for values in [&mut facets.tags, &mut facets.owners, &mut facets.departments] {
				values.sort();
				values.dedup();
			}

			Ok(facets)
		})
	}

	fn mark_dirty<'a>(
		&'a self,
		filename: &'a str,
		error: &'a str,
		available_at: OffsetDateTime,
	) -> BoxFuture<'a, Result<i32>> {
		Box::pin(async move {
			let mut state = lock(&self.state);
			let row = state
				.files
				.entry(filename.to_string())
				.or_insert_with(|| MetadataRow::new(FileMetadata::empty(filename)));

			row.dirty = true;
			row.attempts += 1;
			row.error = Some(error.to_string());
			row.available_at = available_at;

			Ok(row.attempts)
		})
	}

	fn clear_dirty<'a>(&'a self, filename: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			if let Some(row) = lock(&self.state).files.get_mut(filename) {
				row.dirty = false;
				row.attempts = 0;
				row.error = None;
			}

			Ok(())
		})
	}

	fn claim_dirty(
		&self,
		now: OffsetDateTime,
		lease_until: OffsetDateTime,
		limit: i64,
	) -> BoxFuture<'_, Result<Vec<DirtyEntry>>> {
		Box::pin(async move {
			let mut state = lock(&self.state);
			let mut due = state
				.files
				.values_mut()
				.filter(|row| row.dirty && row.available_at <= now)
				.collect::<Vec<_>>();

			due.sort_by(|a, b| {
				a.available_at.cmp(&b.available_at).then_with(|| a.meta.filename.cmp(&b.meta.filename))
			});

			Ok(due
				.into_iter()
				.take(usize::try_from(limit).unwrap_or(0))
				.map(|row| {
					row.available_at = lease_until;

					DirtyEntry { filename: row.meta.filename.clone(), sync_attempts: row.attempts }
				})
				.collect())
		})
	}

	fn get_user(&self, user_id: Uuid) -> BoxFuture<'_, Result<Option<UserRow>>> {
		Box::pin(async move { Ok(lock(&self.state).users.get(&user_id).cloned()) })
	}

	fn get_user_by_name<'a>(
		&'a self,
		username: &'a str,
	) -> BoxFuture<'a, Result<Option<UserRow>>> {
		Box::pin(async move {
			Ok(lock(&self.state).users.values().find(|user| user.username == username).cloned())
		})
	}

	fn upsert_user<'a>(&'a self, user: &'a NewUser) -> BoxFuture<'a, Result<UserRow>> {
		Box::pin(async move {
			let mut state = lock(&self.state);

			if state
				.users
				.values()
				.any(|existing| existing.username == user.username && existing.user_id != user.user_id)
			{
				return Err(Error::Conflict(format!("Username {} is taken.", user.username)));
			}

			let now = OffsetDateTime::now_utc();
			let created_at = state.users.get(&user.user_id).map_or(now, |existing| existing.created_at);
			let row = UserRow {
				user_id: user.user_id,
				username: user.username.clone(),
				password_hash: user.password_hash.clone(),
				department: user.department.clone(),
				is_admin: user.is_admin,
				created_at,
				updated_at: now,
			};

			state.users.insert(user.user_id, row.clone());

			Ok(row)
		})
	}

	fn set_user_department<'a>(
		&'a self,
		user_id: Uuid,
		department: &'a str,
	) -> BoxFuture<'a, Result<Option<UserRow>>> {
		Box::pin(async move {
			Ok(self.update_user(user_id, |user| user.department = department.to_string()))
		})
	}

	fn set_user_admin(
		&self,
		user_id: Uuid,
		is_admin: bool,
	) -> BoxFuture<'_, Result<Option<UserRow>>> {
		Box::pin(async move { Ok(self.update_user(user_id, |user| user.is_admin = is_admin)) })
	}

	fn list_users(&self) -> BoxFuture<'_, Result<Vec<UserRow>>> {
		Box::pin(async move {
			let mut users = lock(&self.state).users.values().cloned().collect::<Vec<_>>();

			users.sort_by(|a, b| a.username.cmp(&b.username));

			Ok(users)
		})
	}

	fn toggle_favorite<'a>(
		&'a self,
		user_id: Uuid,
		filename: &'a str,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let mut state = lock(&self.state);
			let key = (user_id, filename.to_string());

			if state.favorites.remove(&key).is_some() {
				return Ok(false);
			}

			state.favorites.insert(key, OffsetDateTime::now_utc());

			Ok(true)
		})
	}

	fn set_favorite<'a>(
		&'a self,
		user_id: Uuid,
		filename: &'a str,
		favorite: bool,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut state = lock(&self.state);
			let key = (user_id, filename.to_string());

			if favorite {
				state.favorites.entry(key).or_insert_with(OffsetDateTime::now_utc);
			} else {
				state.favorites.remove(&key);
			}

			Ok(())
		})
	}

	fn favorite_filenames<'a>(
		&'a self,
		user_id: Uuid,
		among: &'a [String],
	) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move {
			let state = lock(&self.state);

			Ok(among
				.iter()
				.filter(|name| state.favorites.contains_key(&(user_id, (*name).clone())))
				.cloned()
				.collect())
		})
	}

	fn list_favorites(&self, user_id: Uuid) -> BoxFuture<'_, Result<Vec<FavoriteEntry>>> {
		Box::pin(async move {
			let state = lock(&self.state);
			let mut entries = state
				.favorites
				.iter()
				.filter(|((owner, _), _)| *owner == user_id)
				.map(|((_, filename), created_at)| FavoriteEntry {
					filename: filename.clone(),
					created_at: *created_at,
				})
				.collect::<Vec<_>>();

			entries.sort_by(|a, b| {
				b.created_at.cmp(&a.created_at).then_with(|| a.filename.cmp(&b.filename))
			});

			Ok(entries)
		})
	}

	fn record_access<'a>(
		&'a self,
		user_id: Uuid,
		filename: &'a str,
		at: OffsetDateTime,
		retention: i64,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut state = lock(&self.state);
			let seq = state.next_seq;

			state.next_seq += 1;
			state.recents.push(AccessRow { seq, user_id, filename: filename.to_string(), at });

			let mut mine = state
				.recents
				.iter()
				.filter(|row| row.user_id == user_id)
				.map(|row| (row.at, row.seq))
				.collect::<Vec<_>>();

			mine.sort_by(|a, b| b.cmp(a));

			let keep = usize::try_from(retention).unwrap_or(0);
			let evicted = mine.into_iter().skip(keep).map(|(_, seq)| seq).collect::<Vec<_>>();

			state.recents.retain(|row| !evicted.contains(&row.seq));

			Ok(())
		})
	}

	fn recent_filenames(
		&self,
		user_id: Uuid,
		limit: i64,
	) -> BoxFuture<'_, Result<Vec<RecentEntry>>> {
		Box::pin(async move {
			let state = lock(&self.state);
			let mut latest = HashMap::<&str, OffsetDateTime>::new();

			for row in state.recents.iter().filter(|row| row.user_id == user_id) {
				let entry = latest.entry(row.filename.as_str()).or_insert(row.at);

				if row.at > *entry {
					*entry = row.at;
				}
			}

			let mut entries = latest
				.into_iter()
				.map(|(filename, accessed_at)| RecentEntry {
					filename: filename.to_string(),
					accessed_at,
				})
				.collect::<Vec<_>>();

			entries.sort_by(|a, b| {
				b.accessed_at.cmp(&a.accessed_at).then_with(|| a.filename.cmp(&b.filename))
			});
			entries.truncate(usize::try_from(limit).unwrap_or(0));

			Ok(entries)
		})
	}

	fn forget_file<'a>(&'a self, filename: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut state = lock(&self.state);

			state.favorites.retain(|(_, name), _| name != filename);
			state.recents.retain(|row| row.filename != filename);

			Ok(())
		})
	}
}

/// [`SearchIndex`] that ranks by exact cosine similarity.
#[derive(Default)]
pub struct MemoryIndex {
	docs: Mutex<BTreeMap<String, FileIndexDoc>>,
	unavailable: AtomicBool,
	metadata_pushes: AtomicUsize,
}
impl MemoryIndex {
	pub fn new() -> Self {
		Self::default()
	}

	/// Makes every call fail as if the backend were unreachable.
	pub fn set_unavailable(&self, unavailable: bool) {
		self.unavailable.store(unavailable, Ordering::SeqCst);
	}

	pub fn doc(&self, name: &str) -> Option<FileIndexDoc> {
		lock(&self.docs).get(name).cloned()
	}

	pub fn len(&self) -> usize {
		lock(&self.docs).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Number of successful `apply_metadata` calls so far.
	pub fn metadata_pushes(&self) -> usize {
		self.metadata_pushes.load(Ordering::SeqCst)
	}

	/// Overwrites the cached identity fields directly, simulating a stale index copy.
	pub fn overwrite_cached_identity(&self, name: &str, tags: TagSet, owner: &str, department: &str) {
		if let Some(doc) = lock(&self.docs).get_mut(name) {
			doc.tags = tags;
			doc.owner = owner.to_string();
			doc.department = department.to_string();
		}
	}

	fn check_available(&self) -> Result<()> {
		if self.unavailable.load(Ordering::SeqCst) {
			return Err(Error::Timeout("Search index is unreachable.".to_string()));
		}

		Ok(())
	}
}
impl SearchIndex for MemoryIndex {
	fn ensure_ready(&self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move { self.check_available() })
	}

	fn recreate(&self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move {
			self.check_available()?;
			lock(&self.docs).clear();

			Ok(())
		})
	}

	fn upsert<'a>(&'a self, docs: &'a [FileIndexDoc]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.check_available()?;

			let mut stored = lock(&self.docs);

			for doc in docs {
				stored.insert(doc.name.clone(), doc.clone());
			}

			Ok(())
		})
	}

	fn delete<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.check_available()?;
			lock(&self.docs).remove(name);

			Ok(())
		})
	}

	fn query<'a>(&'a self, query: &'a IndexQuery) -> BoxFuture<'a, Result<Vec<ScoredDoc>>> {
		Box::pin(async move {
			self.check_available()?;

			let docs = lock(&self.docs);
			let mut scored = docs
				.values()
				.filter(|doc| doc.embedding_version == query.embedding_version)
				.filter(|doc| query.filter.matches(doc))
				.filter_map(|doc| {
					let embedding = doc.embedding.as_ref()?;
					let mut doc = doc.clone();
					let score = cosine(&query.vector, embedding);

					doc.embedding = None;

					Some(ScoredDoc { doc, score })
				})
				.collect::<Vec<_>>();

			rank_hits(&mut scored);
			scored.truncate(query.k);

			Ok(scored)
		})
	}

	fn get_many<'a>(&'a self, names: &'a [String]) -> BoxFuture<'a, Result<Vec<FileIndexDoc>>> {
		Box::pin(async move {
			self.check_available()?;

			let docs = lock(&self.docs);

			Ok(names.iter().filter_map(|name| docs.get(name).cloned()).collect())
		})
	}

	fn apply_metadata<'a>(&'a self, meta: &'a FileMetadata) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			self.check_available()?;

			let mut docs = lock(&self.docs);
			let Some(doc) = docs.get_mut(&meta.filename) else {
				return Ok(false);
			};

			doc.apply_metadata(meta);
			self.metadata_pushes.fetch_add(1, Ordering::SeqCst);

			Ok(true)
		})
	}

	fn distinct_values(
		&self,
		field: FacetField,
		limit: u64,
	) -> BoxFuture<'_, Result<Vec<String>>> {
		Box::pin(async move {
			self.check_available()?;

			let docs = lock(&self.docs);
			let mut values = Vec::new();

			for doc in docs.values() {
				match field {
					FacetField::Tags => values.extend(doc.tags.iter().map(str::to_string)),
					FacetField::Owner => values.push(doc.owner.clone()),
					FacetField::Department => values.push(doc.department.clone()),
					FacetField::FileType => values.push(doc.file_type.clone()),
				}
			}

			values.retain(|value| !value.trim().is_empty());
			values.sort();
			values.dedup();
			values.truncate(usize::try_from(limit).unwrap_or(usize::MAX));

			Ok(values)
		})
	}
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
	if a.len() != b.len() {
		return 0.0;
	}

	let dot = a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
	let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
	let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

	if norm_a == 0.0 || norm_b == 0.0 {
		return 0.0;
	}

	dot / (norm_a * norm_b)
}

#[derive(Debug, Clone)]
struct MemoryFile {
	bytes: Vec<u8>,
	modified: Date,
	created: Date,
}

/// [`FileStore`] keyed by name, with controllable dates.
#[derive(Default)]
pub struct MemoryFileStore {
	files: Mutex<BTreeMap<String, MemoryFile>>,
}
impl MemoryFileStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Places a file directly, bypassing the create-new check.
	pub fn put(&self, name: &str, bytes: &[u8], modified: Date, created: Date) {
		lock(&self.files)
			.insert(name.to_string(), MemoryFile { bytes: bytes.to_vec(), modified, created });
	}

	fn stored(name: &str, file: &MemoryFile) -> StoredFile {
		StoredFile {
			name: name.to_string(),
			size_bytes: file.bytes.len() as u64,
			modified: file.modified,
			created: file.created,
		}
	}
}
impl FileStore for MemoryFileStore {
	fn list(&self) -> BoxFuture<'_, Result<Vec<StoredFile>>> {
		Box::pin(async move {
			Ok(lock(&self.files).iter().map(|(name, file)| Self::stored(name, file)).collect())
		})
	}

	fn stat<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<StoredFile>>> {
		Box::pin(async move { Ok(lock(&self.files).get(name).map(|file| Self::stored(name, file))) })
	}

	fn write_new<'a>(&'a self, name: &'a str, bytes: &'a [u8]) -> BoxFuture<'a, Result<StoredFile>> {
		Box::pin(async move {
			let mut files = lock(&self.files);

			if files.contains_key(name) {
				return Err(Error::Conflict(format!("File {name} already exists.")));
			}

			let today = OffsetDateTime::now_utc().date();
			let file = MemoryFile { bytes: bytes.to_vec(), modified: today, created: today };
			let stored = Self::stored(name, &file);

			files.insert(name.to_string(), file);

			Ok(stored)
		})
	}

	fn read<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
		Box::pin(async move {
			lock(&self.files)
				.get(name)
				.map(|file| file.bytes.clone())
				.ok_or_else(|| Error::NotFound(format!("File {name} does not exist.")))
		})
	}

	fn remove<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move { Ok(lock(&self.files).remove(name).is_some()) })
	}
}
