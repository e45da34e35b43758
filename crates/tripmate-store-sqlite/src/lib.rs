use std::collections::BTreeSet;

use chrono::{DateTime, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{sqlite::SqlitePoolOptions, SqliteConnection, SqlitePool};
use tripmate_storage::*;
use uuid::Uuid;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::open("sqlite::memory:").await
    }

    /// Open (and migrate) the database at `url`, e.g. `sqlite://tripmate.db?mode=rwc`.
    ///
    /// A single connection serializes writers, which is what makes the
    /// read-modify-write transactions below atomic per record.
    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(backend_err)?;

        MIGRATOR.run(&pool).await.map_err(backend_err)?;

        Ok(Self { pool })
    }
}

// ─────────────────────────────── Row mapping ───────────────────────────────

type TripRow = (String, String, String, String, Option<String>, String, i64, i64);
type ListRow = (String, String, String, String, Option<String>, i64, i64);
type ItemRow = (
    String,
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    String,
    i64,
    i64,
    i64,
);
type CommentRow = (String, String, String, String, i64);
type InviteRow = (
    String,
    String,
    String,
    i64,
    Option<i64>,
    i64,
    String,
    bool,
    i64,
    i64,
);

fn backend_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

fn new_id() -> String {
    Uuid::now_v7().to_string()
}

fn encode<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(backend_err)
}

fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(backend_err)
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Backend(format!("invalid timestamp: {ms}")))
}

fn trip_from_row(row: TripRow) -> Result<Trip, StoreError> {
    let (id, name, owners, admins, cover_photo, created_by, created_at, updated_at) = row;
    Ok(Trip {
        id: TripId(id),
        name,
        owners: decode(&owners)?,
        admins: decode(&admins)?,
        cover_photo,
        created_by: UserId(created_by),
        created_at: from_millis(created_at)?,
        updated_at: from_millis(updated_at)?,
    })
}

fn list_from_row(row: ListRow) -> Result<List, StoreError> {
    let (id, trip_id, name, created_by, owners, created_at, updated_at) = row;
    Ok(List {
        id: ListId(id),
        trip_id: TripId(trip_id),
        name,
        created_by: UserId(created_by),
        owners: owners.as_deref().map(decode).transpose()?,
        created_at: from_millis(created_at)?,
        updated_at: from_millis(updated_at)?,
    })
}

fn item_from_row(row: ItemRow) -> Result<ListItem, StoreError> {
    let (id, list_id, title, note, created_by, place, liked_by, vote_count, created_at, updated_at) =
        row;
    Ok(ListItem {
        id: ItemId(id),
        list_id: ListId(list_id),
        title,
        note,
        created_by: UserId(created_by),
        place: place.as_deref().map(decode).transpose()?,
        liked_by: decode(&liked_by)?,
        vote_count: vote_count as u32,
        created_at: from_millis(created_at)?,
        updated_at: from_millis(updated_at)?,
    })
}

fn comment_from_row(row: CommentRow) -> Result<Comment, StoreError> {
    let (id, item_id, body, author_id, created_at) = row;
    Ok(Comment {
        id: CommentId(id),
        item_id: ItemId(item_id),
        body,
        author_id: UserId(author_id),
        created_at: from_millis(created_at)?,
    })
}

fn invite_from_row(row: InviteRow) -> Result<Invite, StoreError> {
    let (
        id,
        trip_id,
        created_by,
        expires_at,
        max_uses,
        used_count,
        used_by,
        is_active,
        created_at,
        updated_at,
    ) = row;
    Ok(Invite {
        id: InviteId(id),
        trip_id: TripId(trip_id),
        created_by: UserId(created_by),
        expires_at: from_millis(expires_at)?,
        max_uses: max_uses.map(|m| m as u32),
        used_count: used_count as u32,
        used_by: decode(&used_by)?,
        is_active,
        created_at: from_millis(created_at)?,
        updated_at: from_millis(updated_at)?,
    })
}

// ─────────────────────────────── Point reads ───────────────────────────────

async fn fetch_trip(conn: &mut SqliteConnection, trip_id: &TripId) -> Result<Trip, StoreError> {
    let row = sqlx::query_as::<_, TripRow>(
        "SELECT id,name,owners,admins,cover_photo,created_by,created_at,updated_at
         FROM trips WHERE id=?",
    )
    .bind(&trip_id.0)
    .fetch_optional(&mut *conn)
    .await
    .map_err(backend_err)?;
    row.ok_or(StoreError::NotFound).and_then(trip_from_row)
}

async fn fetch_list(conn: &mut SqliteConnection, list_id: &ListId) -> Result<List, StoreError> {
    let row = sqlx::query_as::<_, ListRow>(
        "SELECT id,trip_id,name,created_by,owners,created_at,updated_at
         FROM lists WHERE id=?",
    )
    .bind(&list_id.0)
    .fetch_optional(&mut *conn)
    .await
    .map_err(backend_err)?;
    row.ok_or(StoreError::NotFound).and_then(list_from_row)
}

async fn fetch_item(conn: &mut SqliteConnection, item_id: &ItemId) -> Result<ListItem, StoreError> {
    let row = sqlx::query_as::<_, ItemRow>(
        "SELECT id,list_id,title,note,created_by,place,liked_by,vote_count,created_at,updated_at
         FROM list_items WHERE id=?",
    )
    .bind(&item_id.0)
    .fetch_optional(&mut *conn)
    .await
    .map_err(backend_err)?;
    row.ok_or(StoreError::NotFound).and_then(item_from_row)
}

async fn fetch_invite(
    conn: &mut SqliteConnection,
    invite_id: &InviteId,
) -> Result<Invite, StoreError> {
    let row = sqlx::query_as::<_, InviteRow>(
        "SELECT id,trip_id,created_by,expires_at,max_uses,used_count,used_by,is_active,created_at,updated_at
         FROM invites WHERE id=?",
    )
    .bind(&invite_id.0)
    .fetch_optional(&mut *conn)
    .await
    .map_err(backend_err)?;
    row.ok_or(StoreError::NotFound).and_then(invite_from_row)
}

// ─────────────────────────── Read-modify-write units ───────────────────────

impl SqliteStore {
    /// Load a trip, let `apply` change it, and write owners/admins back in one transaction.
    /// `apply` returns whether anything changed, or an error that aborts the update.
    async fn modify_trip<F>(&self, trip_id: &TripId, apply: F) -> Result<Trip, StoreError>
    where
        F: FnOnce(&mut Trip) -> Result<bool, StoreError> + Send,
    {
        let mut tx = self.pool.begin().await.map_err(backend_err)?;
        let mut trip = fetch_trip(&mut tx, trip_id).await?;
        // An error drops `tx`, rolling the transaction back.
        if apply(&mut trip)? {
            trip.updated_at = now();
            sqlx::query("UPDATE trips SET owners=?, admins=?, updated_at=? WHERE id=?")
                .bind(encode(&trip.owners)?)
                .bind(encode(&trip.admins)?)
                .bind(trip.updated_at.timestamp_millis())
                .bind(&trip.id.0)
                .execute(&mut *tx)
                .await
                .map_err(backend_err)?;
        }
        tx.commit().await.map_err(backend_err)?;
        Ok(trip)
    }

    async fn modify_list<F>(&self, list_id: &ListId, apply: F) -> Result<List, StoreError>
    where
        F: FnOnce(&mut BTreeSet<UserId>) -> bool + Send,
    {
        let mut tx = self.pool.begin().await.map_err(backend_err)?;
        let mut list = fetch_list(&mut tx, list_id).await?;
        let changed = match list.owners.as_mut() {
            Some(owners) => apply(owners),
            None => false,
        };
        if changed {
            list.updated_at = now();
            let owners = list.owners.as_ref().map(encode).transpose()?;
            sqlx::query("UPDATE lists SET owners=?, updated_at=? WHERE id=?")
                .bind(owners)
                .bind(list.updated_at.timestamp_millis())
                .bind(&list.id.0)
                .execute(&mut *tx)
                .await
                .map_err(backend_err)?;
        }
        tx.commit().await.map_err(backend_err)?;
        Ok(list)
    }

    async fn modify_invite<F>(&self, invite_id: &InviteId, apply: F) -> Result<Invite, StoreError>
    where
        F: FnOnce(&mut Invite) -> bool + Send,
    {
        let mut tx = self.pool.begin().await.map_err(backend_err)?;
        let mut invite = fetch_invite(&mut tx, invite_id).await?;
        if apply(&mut invite) {
            invite.updated_at = now();
            sqlx::query(
                "UPDATE invites SET used_count=?, used_by=?, is_active=?, updated_at=? WHERE id=?",
            )
            .bind(invite.used_count as i64)
            .bind(encode(&invite.used_by)?)
            .bind(invite.is_active)
            .bind(invite.updated_at.timestamp_millis())
            .bind(&invite.id.0)
            .execute(&mut *tx)
            .await
            .map_err(backend_err)?;
        }
        tx.commit().await.map_err(backend_err)?;
        Ok(invite)
    }

    async fn delete_row(&self, sql: &str, id: &str) -> Result<(), StoreError> {
        let res = sqlx::query(sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    // ───────────────────────────── Trips ─────────────────────────────

    async fn create_trip(&self, params: &CreateTripParams) -> Result<Trip, StoreError> {
        let ts = now();
        let members = BTreeSet::from([params.created_by.clone()]);
        let trip = Trip {
            id: TripId(new_id()),
            name: params.name.clone(),
            owners: members.clone(),
            admins: members,
            cover_photo: params.cover_photo.clone(),
            created_by: params.created_by.clone(),
            created_at: ts,
            updated_at: ts,
        };
        sqlx::query(
            "INSERT INTO trips(id,name,owners,admins,cover_photo,created_by,created_at,updated_at)
             VALUES(?,?,?,?,?,?,?,?)",
        )
        .bind(&trip.id.0)
        .bind(&trip.name)
        .bind(encode(&trip.owners)?)
        .bind(encode(&trip.admins)?)
        .bind(&trip.cover_photo)
        .bind(&trip.created_by.0)
        .bind(ts.timestamp_millis())
        .bind(ts.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(trip)
    }

    async fn get_trip(&self, trip_id: &TripId) -> Result<Trip, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(backend_err)?;
        fetch_trip(&mut conn, trip_id).await
    }

    async fn add_trip_owner(
        &self,
        trip_id: &TripId,
        user_id: &UserId,
    ) -> Result<Trip, StoreError> {
        self.modify_trip(trip_id, |trip| Ok(trip.owners.insert(user_id.clone())))
            .await
    }

    async fn remove_trip_owner(
        &self,
        trip_id: &TripId,
        user_id: &UserId,
    ) -> Result<Trip, StoreError> {
        self.modify_trip(trip_id, |trip| {
            if trip.is_sole_owner(user_id) {
                return Err(StoreError::Conflict);
            }
            let removed = trip.owners.remove(user_id);
            Ok(trip.admins.remove(user_id) || removed)
        })
        .await
    }

    async fn delete_trip(&self, trip_id: &TripId) -> Result<(), StoreError> {
        self.delete_row("DELETE FROM trips WHERE id=?", &trip_id.0)
            .await
    }

    // ───────────────────────────── Lists ─────────────────────────────

    async fn create_list(&self, params: &CreateListParams) -> Result<List, StoreError> {
        let ts = now();
        let list = List {
            id: ListId(new_id()),
            trip_id: params.trip_id.clone(),
            name: params.name.clone(),
            created_by: params.created_by.clone(),
            owners: params.owners.clone(),
            created_at: ts,
            updated_at: ts,
        };
        let owners = list.owners.as_ref().map(encode).transpose()?;
        sqlx::query(
            "INSERT INTO lists(id,trip_id,name,created_by,owners,created_at,updated_at)
             VALUES(?,?,?,?,?,?,?)",
        )
        .bind(&list.id.0)
        .bind(&list.trip_id.0)
        .bind(&list.name)
        .bind(&list.created_by.0)
        .bind(owners)
        .bind(ts.timestamp_millis())
        .bind(ts.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(list)
    }

    async fn get_list(&self, list_id: &ListId) -> Result<List, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(backend_err)?;
        fetch_list(&mut conn, list_id).await
    }

    async fn list_lists(&self, trip_id: &TripId, limit: usize) -> Result<Vec<List>, StoreError> {
        let rows = sqlx::query_as::<_, ListRow>(
            "SELECT id,trip_id,name,created_by,owners,created_at,updated_at
             FROM lists WHERE trip_id=? ORDER BY created_at, id LIMIT ?",
        )
        .bind(&trip_id.0)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;
        rows.into_iter().map(list_from_row).collect()
    }

    async fn add_list_owner(
        &self,
        list_id: &ListId,
        user_id: &UserId,
    ) -> Result<List, StoreError> {
        self.modify_list(list_id, |owners| owners.insert(user_id.clone()))
            .await
    }

    async fn remove_list_owner(
        &self,
        list_id: &ListId,
        user_id: &UserId,
    ) -> Result<List, StoreError> {
        self.modify_list(list_id, |owners| owners.remove(user_id))
            .await
    }

    async fn delete_list(&self, list_id: &ListId) -> Result<(), StoreError> {
        self.delete_row("DELETE FROM lists WHERE id=?", &list_id.0)
            .await
    }

    // ───────────────────────────── Items ─────────────────────────────

    async fn create_item(&self, params: &CreateItemParams) -> Result<ListItem, StoreError> {
        let ts = now();
        let item = ListItem {
            id: ItemId(new_id()),
            list_id: params.list_id.clone(),
            title: params.title.clone(),
            note: params.note.clone(),
            created_by: params.created_by.clone(),
            place: params.place.clone(),
            liked_by: BTreeSet::new(),
            vote_count: 0,
            created_at: ts,
            updated_at: ts,
        };
        let place = item.place.as_ref().map(encode).transpose()?;
        sqlx::query(
            "INSERT INTO list_items(id,list_id,title,note,created_by,place,liked_by,vote_count,created_at,updated_at)
             VALUES(?,?,?,?,?,?,?,0,?,?)",
        )
        .bind(&item.id.0)
        .bind(&item.list_id.0)
        .bind(&item.title)
        .bind(&item.note)
        .bind(&item.created_by.0)
        .bind(place)
        .bind(encode(&item.liked_by)?)
        .bind(ts.timestamp_millis())
        .bind(ts.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(item)
    }

    async fn get_item(&self, item_id: &ItemId) -> Result<ListItem, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(backend_err)?;
        fetch_item(&mut conn, item_id).await
    }

    async fn list_items(&self, list_id: &ListId) -> Result<Vec<ListItem>, StoreError> {
        let rows = sqlx::query_as::<_, ItemRow>(
            "SELECT id,list_id,title,note,created_by,place,liked_by,vote_count,created_at,updated_at
             FROM list_items WHERE list_id=? ORDER BY created_at, id",
        )
        .bind(&list_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;
        rows.into_iter().map(item_from_row).collect()
    }

    async fn toggle_item_like(
        &self,
        item_id: &ItemId,
        user_id: &UserId,
    ) -> Result<ListItem, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend_err)?;
        let mut item = fetch_item(&mut tx, item_id).await?;
        item.apply_like_toggle(user_id);
        item.updated_at = now();
        // liked_by and vote_count always move together
        sqlx::query("UPDATE list_items SET liked_by=?, vote_count=?, updated_at=? WHERE id=?")
            .bind(encode(&item.liked_by)?)
            .bind(item.vote_count as i64)
            .bind(item.updated_at.timestamp_millis())
            .bind(&item.id.0)
            .execute(&mut *tx)
            .await
            .map_err(backend_err)?;
        tx.commit().await.map_err(backend_err)?;
        Ok(item)
    }

    async fn delete_item(&self, item_id: &ItemId) -> Result<(), StoreError> {
        self.delete_row("DELETE FROM list_items WHERE id=?", &item_id.0)
            .await
    }

    // ───────────────────────────── Comments ──────────────────────────

    async fn create_comment(&self, params: &CreateCommentParams) -> Result<Comment, StoreError> {
        let comment = Comment {
            id: CommentId(new_id()),
            item_id: params.item_id.clone(),
            body: params.body.clone(),
            author_id: params.author_id.clone(),
            created_at: now(),
        };
        sqlx::query("INSERT INTO comments(id,item_id,body,author_id,created_at) VALUES(?,?,?,?,?)")
            .bind(&comment.id.0)
            .bind(&comment.item_id.0)
            .bind(&comment.body)
            .bind(&comment.author_id.0)
            .bind(comment.created_at.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(comment)
    }

    async fn get_comment(&self, comment_id: &CommentId) -> Result<Comment, StoreError> {
        let row = sqlx::query_as::<_, CommentRow>(
            "SELECT id,item_id,body,author_id,created_at FROM comments WHERE id=?",
        )
        .bind(&comment_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?;
        row.ok_or(StoreError::NotFound).and_then(comment_from_row)
    }

    async fn list_comments(&self, item_id: &ItemId) -> Result<Vec<Comment>, StoreError> {
        let rows = sqlx::query_as::<_, CommentRow>(
            "SELECT id,item_id,body,author_id,created_at
             FROM comments WHERE item_id=? ORDER BY created_at, id",
        )
        .bind(&item_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;
        rows.into_iter().map(comment_from_row).collect()
    }

    async fn delete_comment(&self, comment_id: &CommentId) -> Result<(), StoreError> {
        self.delete_row("DELETE FROM comments WHERE id=?", &comment_id.0)
            .await
    }

    // ───────────────────────────── Invites ───────────────────────────

    async fn create_invite(&self, params: &CreateInviteParams) -> Result<Invite, StoreError> {
        let ts = now();
        let invite = Invite {
            id: params.id.clone(),
            trip_id: params.trip_id.clone(),
            created_by: params.created_by.clone(),
            expires_at: params.expires_at.trunc_subsecs(3),
            max_uses: params.max_uses,
            used_count: 0,
            used_by: BTreeSet::new(),
            is_active: true,
            created_at: ts,
            updated_at: ts,
        };
        sqlx::query(
            "INSERT INTO invites(id,trip_id,created_by,expires_at,max_uses,used_count,used_by,is_active,created_at,updated_at)
             VALUES(?,?,?,?,?,0,?,1,?,?)",
        )
        .bind(&invite.id.0)
        .bind(&invite.trip_id.0)
        .bind(&invite.created_by.0)
        .bind(invite.expires_at.timestamp_millis())
        .bind(invite.max_uses.map(i64::from))
        .bind(encode(&invite.used_by)?)
        .bind(ts.timestamp_millis())
        .bind(ts.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let s = e.to_string();
            if s.contains("UNIQUE") {
                StoreError::AlreadyExists
            } else {
                StoreError::Backend(s)
            }
        })?;
        Ok(invite)
    }

    async fn get_invite(&self, invite_id: &InviteId) -> Result<Invite, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(backend_err)?;
        fetch_invite(&mut conn, invite_id).await
    }

    async fn list_invites(&self, trip_id: &TripId) -> Result<Vec<Invite>, StoreError> {
        let rows = sqlx::query_as::<_, InviteRow>(
            "SELECT id,trip_id,created_by,expires_at,max_uses,used_count,used_by,is_active,created_at,updated_at
             FROM invites WHERE trip_id=? ORDER BY created_at DESC, id DESC",
        )
        .bind(&trip_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;
        rows.into_iter().map(invite_from_row).collect()
    }

    async fn list_active_invites(
        &self,
        trip_id: &TripId,
        created_by: &UserId,
    ) -> Result<Vec<Invite>, StoreError> {
        let rows = sqlx::query_as::<_, InviteRow>(
            "SELECT id,trip_id,created_by,expires_at,max_uses,used_count,used_by,is_active,created_at,updated_at
             FROM invites WHERE trip_id=? AND created_by=? AND is_active=1
             ORDER BY created_at DESC, id DESC",
        )
        .bind(&trip_id.0)
        .bind(&created_by.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;
        rows.into_iter().map(invite_from_row).collect()
    }

    async fn record_invite_use(
        &self,
        invite_id: &InviteId,
        user_id: &UserId,
    ) -> Result<Invite, StoreError> {
        self.modify_invite(invite_id, |invite| invite.apply_use(user_id))
            .await
    }

    async fn deactivate_invite(&self, invite_id: &InviteId) -> Result<(), StoreError> {
        self.modify_invite(invite_id, |invite| {
            std::mem::replace(&mut invite.is_active, false)
        })
        .await
        .map(|_| ())
    }
}
