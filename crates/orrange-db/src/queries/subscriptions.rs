use anyhow::Result;
use rusqlite::{Row, TransactionBehavior};

use super::notifications::insert_notification;
use super::OptionalExt;
use crate::Database;
use crate::models::{NotificationRow, SubscriptionRow};

const SUBSCRIPTION_COLUMNS: &str = "id, subscriber_id, creator_id, price, created_at, expires_at";

#[derive(Debug, thiserror::Error)]
pub enum SubscribeError {
    #[error("You cannot subscribe to yourself")]
    SelfSubscription,
    #[error("Creator not found")]
    CreatorNotFound,
    #[error("Subscriber not found")]
    SubscriberNotFound,
    #[error("You already have an active subscription to this creator")]
    AlreadySubscribed,
    #[error("Insufficient coins: balance {balance}, price {price}")]
    InsufficientFunds { balance: i64, price: i64 },
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Database {
    /// Pay `price` coins to `creator_id` for a 30-day subscription.
    /// Coins, the subscription row and the creator's notification commit together.
    pub fn subscribe(
        &self,
        subscriber_id: i64,
        creator_id: i64,
        price: i64,
    ) -> Result<(SubscriptionRow, NotificationRow), SubscribeError> {
        if subscriber_id == creator_id {
            return Err(SubscribeError::SelfSubscription);
        }

        self.with_writer(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let creator_exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
                [creator_id],
                |row| row.get(0),
            )?;
            if !creator_exists {
                return Err(SubscribeError::CreatorNotFound);
            }

            let active: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM subscriptions
                               WHERE subscriber_id = ?1 AND creator_id = ?2
                                 AND expires_at > datetime('now'))",
                [subscriber_id, creator_id],
                |row| row.get(0),
            )?;
            if active {
                return Err(SubscribeError::AlreadySubscribed);
            }

            let (balance, username): (i64, String) = tx
                .query_row(
                    "SELECT coins, username FROM users WHERE id = ?1",
                    [subscriber_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?
                .ok_or(SubscribeError::SubscriberNotFound)?;
            if balance < price {
                return Err(SubscribeError::InsufficientFunds { balance, price });
            }

            tx.execute(
                "UPDATE users SET coins = coins - ?2 WHERE id = ?1",
                [subscriber_id, price],
            )?;
            tx.execute(
                "UPDATE users SET coins = coins + ?2 WHERE id = ?1",
                [creator_id, price],
            )?;
            tx.execute(
                "INSERT INTO subscriptions (subscriber_id, creator_id, price) VALUES (?1, ?2, ?3)",
                [subscriber_id, creator_id, price],
            )?;
            let id = tx.last_insert_rowid();
            let subscription = tx.query_row(
                &format!("SELECT {} FROM subscriptions WHERE id = ?1", SUBSCRIPTION_COLUMNS),
                [id],
                subscription_from_row,
            )?;

            let notification = insert_notification(
                &tx,
                creator_id,
                Some(subscriber_id),
                "subscription",
                &format!("{} subscribed to you", username),
                Some(id),
            )?;

            tx.commit()?;
            Ok((subscription, notification))
        })
    }

    /// The user's subscriptions, active or expired, newest first.
    pub fn list_subscriptions(&self, subscriber_id: i64) -> Result<Vec<SubscriptionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM subscriptions WHERE subscriber_id = ?1 ORDER BY id DESC",
                SUBSCRIPTION_COLUMNS
            ))?;
            let rows = stmt
                .query_map([subscriber_id], subscription_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn subscription_from_row(row: &Row<'_>) -> rusqlite::Result<SubscriptionRow> {
    Ok(SubscriptionRow {
        id: row.get(0)?,
        subscriber_id: row.get(1)?,
        creator_id: row.get(2)?,
        price: row.get(3)?,
        created_at: row.get(4)?,
        expires_at: row.get(5)?,
    })
}
