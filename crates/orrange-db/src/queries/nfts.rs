use anyhow::Result;
use rusqlite::{Connection, Row, TransactionBehavior};

use super::notifications::insert_notification;
use super::OptionalExt;
use crate::Database;
use crate::models::{NftRow, NotificationRow};

const NFT_COLUMNS: &str =
    "id, owner_id, creator_id, name, description, image_url, token_hash, created_at";

#[derive(Debug, thiserror::Error)]
pub enum NftTransferError {
    #[error("NFT not found")]
    NotFound,
    #[error("Only the owner can transfer this NFT")]
    NotOwner,
    #[error("Recipient not found")]
    RecipientNotFound,
    #[error("Cannot transfer an NFT to yourself")]
    SelfTransfer,
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Database {
    pub fn mint_nft(
        &self,
        owner_id: i64,
        name: &str,
        description: Option<&str>,
        image_url: Option<&str>,
        token_hash: &str,
    ) -> Result<NftRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO nfts (owner_id, creator_id, name, description, image_url, token_hash)
                 VALUES (?1, ?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![owner_id, name, description, image_url, token_hash],
            )?;
            let id = conn.last_insert_rowid();
            query_nft(conn, id)?.ok_or_else(|| anyhow::anyhow!("NFT {} vanished after insert", id))
        })
    }

    /// Newest first; `owner_id` narrows to one owner.
    pub fn list_nfts(&self, owner_id: Option<i64>) -> Result<Vec<NftRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM nfts WHERE ?1 IS NULL OR owner_id = ?1 ORDER BY id DESC",
                NFT_COLUMNS
            ))?;
            let rows = stmt
                .query_map([owner_id], nft_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Change ownership and notify the recipient, atomically.
    pub fn transfer_nft(
        &self,
        nft_id: i64,
        from_user: i64,
        to_user: i64,
    ) -> Result<(NftRow, NotificationRow), NftTransferError> {
        self.with_writer(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let nft = query_nft(&tx, nft_id)?.ok_or(NftTransferError::NotFound)?;
            if nft.owner_id != from_user {
                return Err(NftTransferError::NotOwner);
            }
            if to_user == from_user {
                return Err(NftTransferError::SelfTransfer);
            }
            let recipient_exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
                [to_user],
                |row| row.get(0),
            )?;
            if !recipient_exists {
                return Err(NftTransferError::RecipientNotFound);
            }

            tx.execute("UPDATE nfts SET owner_id = ?2 WHERE id = ?1", [nft_id, to_user])?;
            let notification = insert_notification(
                &tx,
                to_user,
                Some(from_user),
                "nft_transfer",
                &format!("You received the NFT \"{}\"", nft.name),
                Some(nft_id),
            )?;
            let nft = query_nft(&tx, nft_id)?.ok_or(NftTransferError::NotFound)?;

            tx.commit()?;
            Ok((nft, notification))
        })
    }
}

fn query_nft(conn: &Connection, id: i64) -> Result<Option<NftRow>> {
    conn.query_row(
        &format!("SELECT {} FROM nfts WHERE id = ?1", NFT_COLUMNS),
        [id],
        nft_from_row,
    )
    .optional()
}

fn nft_from_row(row: &Row<'_>) -> rusqlite::Result<NftRow> {
    Ok(NftRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        creator_id: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        image_url: row.get(5)?,
        token_hash: row.get(6)?,
        created_at: row.get(7)?,
    })
}
