use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ListingId, OfferId, UserId, Version};
use domain::{
    Actor, Aggregate, Offer, OfferEvent, OfferSnapshot, OfferStatus, Quantity, Terms, UnitPrice,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    EventEnvelope, EventId, OfferQuery, Page, PartyRole, Result, StoreError,
    store::{ExpectedState, OfferStore, validate_write},
};

const ACTIVE_INDEX: &str = "offers_one_active_per_buyer";
const OFFERS_PKEY: &str = "offers_pkey";
const SEQUENCE_CONSTRAINT: &str = "unique_offer_sequence";

const OFFER_COLUMNS: &str = "id, listing_id, buyer_id, seller_id, offer_price, quantity, \
     total_price, counter_price, status, current_round, last_actor_id, expires_at, message, \
     counter_message, created_at, updated_at, version";

const EVENT_COLUMNS: &str = "id, offer_id, sequence, event_type, actor, price_per_unit, \
     quantity, total_price, message, created_at, payload";

/// PostgreSQL-backed offer store.
#[derive(Clone)]
pub struct PostgresOfferStore {
    pool: PgPool,
}

impl PostgresOfferStore {
    /// Creates a new PostgreSQL offer store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn decode_err(column: &str, detail: impl std::fmt::Display) -> StoreError {
        StoreError::Decode(format!("{column}: {detail}"))
    }

    fn row_to_offer(row: PgRow) -> Result<Offer> {
        let status: String = row.try_get("status")?;
        let quantity: i64 = row.try_get("quantity")?;
        let round: i32 = row.try_get("current_round")?;
        let counter_price: Option<Decimal> = row.try_get("counter_price")?;

        let snapshot = OfferSnapshot {
            id: OfferId::from_uuid(row.try_get::<Uuid, _>("id")?),
            listing_id: ListingId::from_uuid(row.try_get::<Uuid, _>("listing_id")?),
            buyer_id: UserId::from_uuid(row.try_get::<Uuid, _>("buyer_id")?),
            seller_id: UserId::from_uuid(row.try_get::<Uuid, _>("seller_id")?),
            offer_price: UnitPrice::new(row.try_get("offer_price")?)
                .map_err(|e| Self::decode_err("offer_price", e))?,
            quantity: Self::decode_quantity(quantity)?,
            total_price: domain::Money::round_half_up(row.try_get("total_price")?),
            counter_price: counter_price
                .map(UnitPrice::new)
                .transpose()
                .map_err(|e| Self::decode_err("counter_price", e))?,
            status: status
                .parse::<OfferStatus>()
                .map_err(|e| Self::decode_err("status", e))?,
            current_round: u32::try_from(round).map_err(|e| Self::decode_err("current_round", e))?,
            last_actor_id: UserId::from_uuid(row.try_get::<Uuid, _>("last_actor_id")?),
            expires_at: row.try_get::<Option<DateTime<Utc>>, _>("expires_at")?,
            message: row.try_get("message")?,
            counter_message: row.try_get("counter_message")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            version: Version::new(row.try_get("version")?),
        };
        Ok(snapshot.into())
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        let actor: String = row.try_get("actor")?;
        let event_type: String = row.try_get("event_type")?;
        let payload: serde_json::Value = row.try_get("payload")?;
        let price: Option<Decimal> = row.try_get("price_per_unit")?;
        let quantity: Option<i64> = row.try_get("quantity")?;

        let terms = match (price, quantity) {
            (Some(price), Some(quantity)) => Some(
                Terms::new(
                    UnitPrice::new(price).map_err(|e| Self::decode_err("price_per_unit", e))?,
                    Self::decode_quantity(quantity)?,
                )
                .map_err(|e| Self::decode_err("total_price", e))?,
            ),
            _ => None,
        };

        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            offer_id: OfferId::from_uuid(row.try_get::<Uuid, _>("offer_id")?),
            sequence: Version::new(row.try_get("sequence")?),
            event_type: serde_json::from_value(serde_json::Value::String(event_type))?,
            actor: Actor::try_from(actor).map_err(|e| Self::decode_err("actor", e))?,
            terms,
            message: row.try_get("message")?,
            created_at: row.try_get("created_at")?,
            payload,
        })
    }

    fn decode_quantity(value: i64) -> Result<Quantity> {
        u32::try_from(value)
            .map_err(|e| Self::decode_err("quantity", e))
            .and_then(|units| Quantity::new(units).map_err(|e| Self::decode_err("quantity", e)))
    }

    /// Maps unique violations on the known constraints to domain errors.
    fn map_write_err(err: sqlx::Error, offer: &Offer, expected: Option<ExpectedState>) -> StoreError {
        if let sqlx::Error::Database(ref db_err) = err {
            match db_err.constraint() {
                Some(ACTIVE_INDEX) => {
                    return StoreError::DuplicateActiveOffer {
                        listing_id: offer.listing_id(),
                        buyer_id: offer.buyer_id(),
                    };
                }
                Some(OFFERS_PKEY) => return StoreError::OfferExists(offer.id()),
                Some(SEQUENCE_CONSTRAINT) => {
                    if let Some(expected) = expected {
                        return StoreError::StaleState {
                            offer_id: offer.id(),
                            expected_status: expected.status,
                            expected_version: expected.version,
                        };
                    }
                    return StoreError::OfferExists(offer.id());
                }
                _ => {}
            }
        }
        StoreError::Database(err)
    }

    async fn insert_event(
        tx: &mut Transaction<'_, Postgres>,
        envelope: &EventEnvelope,
    ) -> std::result::Result<(), sqlx::Error> {
        let terms = envelope.terms;
        sqlx::query(
            r#"
            INSERT INTO offer_events (id, offer_id, sequence, event_type, actor, price_per_unit, quantity, total_price, message, created_at, payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(envelope.event_id.as_uuid())
        .bind(envelope.offer_id.as_uuid())
        .bind(envelope.sequence.as_i64())
        .bind(envelope.event_type.as_str())
        .bind(envelope.actor.to_string())
        .bind(terms.map(|t| t.price_per_unit.amount()))
        .bind(terms.map(|t| i64::from(t.quantity.get())))
        .bind(terms.map(|t| t.total_price.amount()))
        .bind(&envelope.message)
        .bind(envelope.created_at)
        .bind(&envelope.payload)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl OfferStore for PostgresOfferStore {
    #[tracing::instrument(skip(self, offer, event), fields(offer_id = %offer.id()))]
    async fn insert_offer(&self, offer: &Offer, event: &OfferEvent) -> Result<()> {
        validate_write(offer, event, None)?;
        let envelope = EventEnvelope::record(offer.id(), offer.version(), event)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO offers ({OFFER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)"
        ))
        .bind(offer.id().as_uuid())
        .bind(offer.listing_id().as_uuid())
        .bind(offer.buyer_id().as_uuid())
        .bind(offer.seller_id().as_uuid())
        .bind(offer.offer_price().amount())
        .bind(i64::from(offer.quantity().get()))
        .bind(offer.total_price().amount())
        .bind(offer.counter_price().map(|p| p.amount()))
        .bind(offer.status().as_str())
        .bind(i32::try_from(offer.current_round()).unwrap_or(i32::MAX))
        .bind(offer.last_actor_id().as_uuid())
        .bind(offer.expires_at())
        .bind(offer.message())
        .bind(offer.counter_message())
        .bind(offer.created_at())
        .bind(offer.updated_at())
        .bind(offer.version().as_i64())
        .execute(&mut *tx)
        .await
        .map_err(|e| Self::map_write_err(e, offer, None))?;

        Self::insert_event(&mut tx, &envelope)
            .await
            .map_err(|e| Self::map_write_err(e, offer, None))?;

        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, offer, event), fields(offer_id = %offer.id(), event_type = %event.kind()))]
    async fn commit_transition(
        &self,
        offer: &Offer,
        event: &OfferEvent,
        expected: ExpectedState,
    ) -> Result<()> {
        validate_write(offer, event, Some(expected))?;
        let envelope = EventEnvelope::record(offer.id(), offer.version(), event)?;

        let mut tx = self.pool.begin().await?;

        // Conditional update on (status, version)
        let updated = sqlx::query(
            r#"
            UPDATE offers SET
                total_price = $2,
                counter_price = $3,
                status = $4,
                current_round = $5,
                last_actor_id = $6,
                expires_at = $7,
                counter_message = $8,
                updated_at = $9,
                version = $10
            WHERE id = $1 AND status = $11 AND version = $12
            "#,
        )
        .bind(offer.id().as_uuid())
        .bind(offer.total_price().amount())
        .bind(offer.counter_price().map(|p| p.amount()))
        .bind(offer.status().as_str())
        .bind(i32::try_from(offer.current_round()).unwrap_or(i32::MAX))
        .bind(offer.last_actor_id().as_uuid())
        .bind(offer.expires_at())
        .bind(offer.counter_message())
        .bind(offer.updated_at())
        .bind(offer.version().as_i64())
        .bind(expected.status.as_str())
        .bind(expected.version.as_i64())
        .execute(&mut *tx)
        .await
        .map_err(|e| Self::map_write_err(e, offer, Some(expected)))?;

        if updated.rows_affected() == 0 {
            let exists: Option<i64> = sqlx::query_scalar("SELECT version FROM offers WHERE id = $1")
                .bind(offer.id().as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match exists {
                Some(_) => StoreError::StaleState {
                    offer_id: offer.id(),
                    expected_status: expected.status,
                    expected_version: expected.version,
                },
                None => StoreError::OfferNotFound(offer.id()),
            });
        }

        Self::insert_event(&mut tx, &envelope)
            .await
            .map_err(|e| Self::map_write_err(e, offer, Some(expected)))?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_offer(&self, offer_id: OfferId) -> Result<Option<Offer>> {
        let row = sqlx::query(&format!("SELECT {OFFER_COLUMNS} FROM offers WHERE id = $1"))
            .bind(offer_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_offer).transpose()
    }

    async fn get_events(&self, offer_id: OfferId) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM offer_events WHERE offer_id = $1 ORDER BY sequence ASC"
        ))
        .bind(offer_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn find_active_offer(
        &self,
        listing_id: ListingId,
        buyer_id: UserId,
    ) -> Result<Option<Offer>> {
        let row = sqlx::query(&format!(
            "SELECT {OFFER_COLUMNS} FROM offers \
             WHERE listing_id = $1 AND buyer_id = $2 AND status IN ('pending', 'countered')"
        ))
        .bind(listing_id.as_uuid())
        .bind(buyer_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_offer).transpose()
    }

    async fn list_offers(&self, query: &OfferQuery) -> Result<Page<Offer>> {
        // $1 is always the party
        let mut filter = String::from(match query.role {
            PartyRole::Buyer => "buyer_id = $1",
            PartyRole::Seller => "seller_id = $1",
            PartyRole::Any => "(buyer_id = $1 OR seller_id = $1)",
        });
        let mut param_count = 1;

        let statuses: Vec<String> = query
            .statuses
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        if !statuses.is_empty() {
            param_count += 1;
            filter.push_str(&format!(" AND status = ANY(${param_count})"));
        }
        if query.listing_id.is_some() {
            param_count += 1;
            filter.push_str(&format!(" AND listing_id = ${param_count}"));
        }

        let count_sql = format!("SELECT COUNT(*) FROM offers WHERE {filter}");
        let list_sql = format!(
            "SELECT {OFFER_COLUMNS} FROM offers WHERE {filter} \
             ORDER BY created_at DESC, id DESC LIMIT ${} OFFSET ${}",
            param_count + 1,
            param_count + 2
        );

        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql).bind(query.party.as_uuid());
        let mut list_query = sqlx::query(&list_sql).bind(query.party.as_uuid());
        if !statuses.is_empty() {
            count_query = count_query.bind(statuses.clone());
            list_query = list_query.bind(statuses);
        }
        if let Some(listing_id) = query.listing_id {
            count_query = count_query.bind(listing_id.as_uuid());
            list_query = list_query.bind(listing_id.as_uuid());
        }
        let limit = i64::try_from(query.limit()).unwrap_or(i64::MAX);
        let offset = i64::try_from(query.offset()).unwrap_or(i64::MAX);
        list_query = list_query.bind(limit).bind(offset);

        let total = count_query.fetch_one(&self.pool).await?;
        let rows = list_query.fetch_all(&self.pool).await?;
        let items = rows
            .into_iter()
            .map(Self::row_to_offer)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            items,
            total: u64::try_from(total).unwrap_or_default(),
            page: query.page,
            per_page: query.per_page,
        })
    }

    async fn list_overdue(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Offer>> {
        let rows = sqlx::query(&format!(
            "SELECT {OFFER_COLUMNS} FROM offers \
             WHERE status IN ('pending', 'countered') AND expires_at < $1 \
             ORDER BY expires_at ASC LIMIT $2"
        ))
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_offer).collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
