use anyhow::Result;
use rusqlite::{Row, TransactionBehavior};

use super::notifications::insert_notification;
use super::{AUTHOR_COLUMNS, OptionalExt, author_at};
use crate::Database;
use crate::models::{ListingRow, NotificationRow};

#[derive(Debug, thiserror::Error)]
pub enum PurchaseError {
    #[error("Listing not found")]
    ListingNotFound,
    #[error("Listing has already been sold")]
    AlreadySold,
    #[error("You cannot buy your own listing")]
    SelfPurchase,
    #[error("Buyer not found")]
    BuyerNotFound,
    #[error("Insufficient coins: balance {balance}, price {price}")]
    InsufficientFunds { balance: i64, price: i64 },
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Outcome of a committed purchase.
#[derive(Debug)]
pub struct PurchaseReceipt {
    pub listing_id: i64,
    pub title: String,
    pub seller_id: i64,
    pub buyer_id: i64,
    pub price: i64,
    pub buyer_coins: i64,
    pub seller_notification: NotificationRow,
}

fn listing_select() -> String {
    format!(
        "SELECT l.id, {}, l.title, l.description, l.price, l.image_url, l.is_sold, l.buyer_id, l.created_at
         FROM marketplace_listings l JOIN users u ON u.id = l.seller_id",
        AUTHOR_COLUMNS
    )
}

impl Database {
    pub fn create_listing(
        &self,
        seller_id: i64,
        title: &str,
        description: Option<&str>,
        price: i64,
        image_url: Option<&str>,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO marketplace_listings (seller_id, title, description, price, image_url)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![seller_id, title, description, price, image_url],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_listing(&self, id: i64) -> Result<Option<ListingRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{} WHERE l.id = ?1", listing_select()),
                [id],
                listing_from_row,
            )
            .optional()
        })
    }

    /// Unsold listings, newest first.
    pub fn list_listings(&self, limit: u32, offset: u32) -> Result<Vec<ListingRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE l.is_sold = 0 ORDER BY l.created_at DESC, l.id DESC LIMIT ?1 OFFSET ?2",
                listing_select()
            ))?;
            let rows = stmt
                .query_map([limit, offset], listing_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Buy a listing in one immediate transaction on the writer.
    ///
    /// The listing row is re-checked under the write lock, so of two
    /// competing buyers exactly one commits; the other sees `AlreadySold`.
    /// Any error drops the transaction, which rolls everything back.
    pub fn purchase_listing(&self, listing_id: i64, buyer_id: i64) -> Result<PurchaseReceipt, PurchaseError> {
        self.with_writer(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let (seller_id, title, price, is_sold): (i64, String, i64, bool) = tx
                .query_row(
                    "SELECT seller_id, title, price, is_sold FROM marketplace_listings WHERE id = ?1",
                    [listing_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()?
                .ok_or(PurchaseError::ListingNotFound)?;

            if is_sold {
                return Err(PurchaseError::AlreadySold);
            }
            if seller_id == buyer_id {
                return Err(PurchaseError::SelfPurchase);
            }

            let balance: i64 = tx
                .query_row("SELECT coins FROM users WHERE id = ?1", [buyer_id], |row| row.get(0))
                .optional()?
                .ok_or(PurchaseError::BuyerNotFound)?;
            if balance < price {
                return Err(PurchaseError::InsufficientFunds { balance, price });
            }

            tx.execute(
                "UPDATE users SET coins = coins - ?2 WHERE id = ?1",
                [buyer_id, price],
            )?;
            tx.execute(
                "UPDATE users SET coins = coins + ?2 WHERE id = ?1",
                [seller_id, price],
            )?;

            let marked = tx.execute(
                "UPDATE marketplace_listings
                 SET is_sold = 1, buyer_id = ?2, sold_at = datetime('now')
                 WHERE id = ?1 AND is_sold = 0",
                [listing_id, buyer_id],
            )?;
            if marked != 1 {
                return Err(PurchaseError::AlreadySold);
            }

            let buyer_name: String = tx.query_row(
                "SELECT username FROM users WHERE id = ?1",
                [buyer_id],
                |row| row.get(0),
            )?;
            let seller_notification = insert_notification(
                &tx,
                seller_id,
                Some(buyer_id),
                "sale",
                &format!("{} bought your listing \"{}\" for {} coins", buyer_name, title, price),
                Some(listing_id),
            )?;

            tx.commit()?;

            Ok(PurchaseReceipt {
                listing_id,
                title,
                seller_id,
                buyer_id,
                price,
                buyer_coins: balance - price,
                seller_notification,
            })
        })
    }
}

fn listing_from_row(row: &Row<'_>) -> rusqlite::Result<ListingRow> {
    Ok(ListingRow {
        id: row.get(0)?,
        seller: author_at(row, 1)?,
        title: row.get(6)?,
        description: row.get(7)?,
        price: row.get(8)?,
        image_url: row.get(9)?,
        is_sold: row.get(10)?,
        buyer_id: row.get(11)?,
        created_at: row.get(12)?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::PurchaseError;
    use crate::queries::test_support::{db, user};

    #[test]
    fn purchase_moves_coins_and_marks_sold() {
        let db = db();
        let seller = user(&db, "seller", 10);
        let buyer = user(&db, "buyer", 100);
        let listing = db.create_listing(seller, "lamp", None, 40, None).unwrap();

        let receipt = db.purchase_listing(listing, buyer).unwrap();
        assert_eq!(receipt.buyer_coins, 60);
        assert_eq!(receipt.seller_notification.user_id, seller);
        assert_eq!(receipt.seller_notification.kind, "sale");

        assert_eq!(db.get_coins(buyer).unwrap(), Some(60));
        assert_eq!(db.get_coins(seller).unwrap(), Some(50));
        let row = db.get_listing(listing).unwrap().unwrap();
        assert!(row.is_sold);
        assert_eq!(row.buyer_id, Some(buyer));
        assert!(db.list_listings(20, 0).unwrap().is_empty());
    }

    #[test]
    fn insufficient_funds_changes_nothing() {
        let db = db();
        let seller = user(&db, "seller", 10);
        let buyer = user(&db, "buyer", 30);
        let listing = db.create_listing(seller, "lamp", None, 40, None).unwrap();

        let err = db.purchase_listing(listing, buyer).unwrap_err();
        assert!(matches!(err, PurchaseError::InsufficientFunds { balance: 30, price: 40 }));

        assert_eq!(db.get_coins(buyer).unwrap(), Some(30));
        assert_eq!(db.get_coins(seller).unwrap(), Some(10));
        assert!(!db.get_listing(listing).unwrap().unwrap().is_sold);
        assert_eq!(db.unread_notification_count(seller).unwrap(), 0);
    }

    #[test]
    fn self_purchase_and_missing_listing_are_rejected() {
        let db = db();
        let seller = user(&db, "seller", 500);
        let listing = db.create_listing(seller, "lamp", None, 40, None).unwrap();

        assert!(matches!(
            db.purchase_listing(listing, seller).unwrap_err(),
            PurchaseError::SelfPurchase
        ));
        assert!(matches!(
            db.purchase_listing(listing + 100, seller).unwrap_err(),
            PurchaseError::ListingNotFound
        ));
    }

    #[test]
    fn second_purchase_sees_sold_listing() {
        let db = db();
        let seller = user(&db, "seller", 0);
        let first = user(&db, "first", 100);
        let second = user(&db, "second", 100);
        let listing = db.create_listing(seller, "lamp", None, 40, None).unwrap();

        db.purchase_listing(listing, first).unwrap();
        assert!(matches!(
            db.purchase_listing(listing, second).unwrap_err(),
            PurchaseError::AlreadySold
        ));
        assert_eq!(db.get_coins(second).unwrap(), Some(100));
    }

    #[test]
    fn concurrent_buyers_exactly_one_wins() {
        let db = Arc::new(db());
        let seller = user(&db, "seller", 0);
        let buyers: Vec<i64> = (0..8).map(|i| user(&db, &format!("buyer{}", i), 100)).collect();
        let listing = db.create_listing(seller, "lamp", None, 40, None).unwrap();

        let handles: Vec<_> = buyers
            .iter()
            .map(|&buyer| {
                let db = db.clone();
                std::thread::spawn(move || db.purchase_listing(listing, buyer).is_ok())
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);

        assert_eq!(db.get_coins(seller).unwrap(), Some(40));
        let total: i64 = buyers.iter().map(|b| db.get_coins(*b).unwrap().unwrap()).sum();
        assert_eq!(total, 8 * 100 - 40);
    }
}
