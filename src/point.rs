//! The signed, expiring, partially-consumable point ledger.
//!
//! Entries are append-only: `use_point` and `expired` advance in place, and
//! only the reversal path deletes a row. Every entry snapshots the member's
//! running balance at insertion time (`member_point`), and the member row
//! carries a cached total that must always equal the sum of the member's
//! surviving deltas.
//!
//! Crediting is exactly-once per `(member, rel_table, rel_id, rel_action)`.
//! The existence check here is check-then-insert; under concurrent
//! duplicates a store-level uniqueness constraint on the triple is the
//! recommended hardening, with constraint violations read as AlreadyGranted.

use crate::config::Config;
use crate::error::Result;
use crate::orm::{members, points};
use chrono::prelude::Utc;
use chrono::Duration;
use sea_orm::sea_query::Expr;
use sea_orm::{entity::*, query::*, DatabaseConnection};

/// Idempotency key tying a ledger entry to the action that earned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelKey {
    pub rel_table: String,
    pub rel_id: String,
    pub rel_action: String,
}

impl RelKey {
    pub fn new(rel_table: &str, rel_id: &str, rel_action: &str) -> Self {
        Self {
            rel_table: rel_table.to_owned(),
            rel_id: rel_id.to_owned(),
            rel_action: rel_action.to_owned(),
        }
    }

    /// Key for a board action ("read", "write", "comment", "download").
    pub fn board(board_id: &str, write_id: i32, action: &str) -> Self {
        Self::new(board_id, &write_id.to_string(), action)
    }

    fn is_empty(&self) -> bool {
        self.rel_table.is_empty() && self.rel_id.is_empty() && self.rel_action.is_empty()
    }
}

/// What `grant` did. `AlreadyGranted` is a success, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    Granted { balance: i64 },
    AlreadyGranted,
    /// Points disabled sitewide, or the delta was zero.
    Disabled,
    NoSuchMember,
}

/// Records a point event for a member.
///
/// Inserts an entry whose running balance extends the chain, updates the
/// member's cached total to match, and honors the idempotency triple.
/// Negative deltas are consumption: they are born expired and immediately
/// allocated across the member's unspent credits.
pub async fn grant(
    db: &DatabaseConnection,
    config: &Config,
    member_id: &str,
    delta: i64,
    content: &str,
    rel: Option<&RelKey>,
    expire_days: Option<i64>,
) -> Result<GrantOutcome> {
    if !config.use_point || delta == 0 {
        return Ok(GrantOutcome::Disabled);
    }
    if member_id.is_empty() {
        return Ok(GrantOutcome::NoSuchMember);
    }
    let member = match members::Entity::find_by_id(member_id).one(db).await? {
        Some(member) => member,
        None => return Ok(GrantOutcome::NoSuchMember),
    };

    if let Some(rel) = rel.filter(|rel| !rel.is_empty()) {
        let duplicate = points::Entity::find()
            .filter(points::Column::MemberId.eq(member_id))
            .filter(points::Column::RelTable.eq(rel.rel_table.as_str()))
            .filter(points::Column::RelId.eq(rel.rel_id.as_str()))
            .filter(points::Column::RelAction.eq(rel.rel_action.as_str()))
            .one(db)
            .await?;
        if duplicate.is_some() {
            return Ok(GrantOutcome::AlreadyGranted);
        }
    }

    let now = Utc::now().naive_utc();
    let balance = sum_for_member(db, config, member_id).await?;

    let (expired, expire_date) = if delta < 0 {
        // Consumption has no grace period.
        (points::EXPIRED, Some(now))
    } else if config.point_term > 0 {
        let days = expire_days.filter(|&d| d > 0).unwrap_or(config.point_term);
        (points::LIVE, Some(now + Duration::days(days - 1)))
    } else {
        (points::LIVE, None)
    };

    let rel = rel.cloned().unwrap_or_else(|| RelKey::new("", "", ""));
    points::ActiveModel {
        member_id: Set(member_id.to_owned()),
        created_at: Set(now),
        content: Set(content.to_owned()),
        point: Set(delta),
        use_point: Set(0),
        member_point: Set(balance + delta),
        expired: Set(expired),
        expire_date: Set(expire_date),
        rel_table: Set(rel.rel_table),
        rel_id: Set(rel.rel_id),
        rel_action: Set(rel.rel_action),
        ..Default::default()
    }
    .insert(db)
    .await?;

    members::Entity::update_many()
        .col_expr(members::Column::Point, Expr::value(balance + delta))
        .filter(members::Column::Id.eq(member.id.as_str()))
        .exec(db)
        .await?;

    if delta < 0 {
        consume_excluding(db, config, member_id, -delta, None).await?;
    }

    Ok(GrantOutcome::Granted {
        balance: balance + delta,
    })
}

/// Sum of the member's surviving deltas, after sweeping expired credit.
pub async fn sum_for_member(
    db: &DatabaseConnection,
    config: &Config,
    member_id: &str,
) -> Result<i64> {
    if config.point_term > 0 {
        sweep_expired(db, config, member_id).await?;
    }

    let entries = points::Entity::find()
        .filter(points::Column::MemberId.eq(member_id))
        .all(db)
        .await?;
    Ok(entries.iter().map(|e| e.point).sum())
}

/// Converts past-due live credit into one offsetting negative entry so the
/// running-balance chain stays append-only, then marks the stragglers.
pub async fn sweep_expired(
    db: &DatabaseConnection,
    config: &Config,
    member_id: &str,
) -> Result<()> {
    if config.point_term <= 0 {
        return Ok(());
    }
    let now = Utc::now().naive_utc();

    let due = points::Entity::find()
        .filter(points::Column::MemberId.eq(member_id))
        .filter(points::Column::Expired.eq(points::LIVE))
        .filter(points::Column::ExpireDate.is_not_null())
        .filter(points::Column::ExpireDate.lt(now))
        .all(db)
        .await?;
    let expire_sum: i64 = due.iter().map(|e| e.remaining()).sum();

    if expire_sum > 0 {
        let member = members::Entity::find_by_id(member_id).one(db).await?;
        let cached = member.map(|m| m.point).unwrap_or(0);

        points::ActiveModel {
            member_id: Set(member_id.to_owned()),
            created_at: Set(now),
            content: Set("point expiry".to_owned()),
            point: Set(-expire_sum),
            use_point: Set(0),
            member_point: Set(cached - expire_sum),
            expired: Set(points::EXPIRED),
            expire_date: Set(Some(now)),
            rel_table: Set("@expire".to_owned()),
            rel_id: Set(member_id.to_owned()),
            rel_action: Set(format!("expire-{}", uuid::Uuid::new_v4())),
            ..Default::default()
        }
        .insert(db)
        .await?;

        members::Entity::update_many()
            .col_expr(members::Column::Point, Expr::value(cached - expire_sum))
            .filter(members::Column::Id.eq(member_id))
            .exec(db)
            .await?;
    }

    points::Entity::update_many()
        .col_expr(points::Column::Expired, Expr::value(points::EXPIRED))
        .filter(points::Column::MemberId.eq(member_id))
        .filter(points::Column::Expired.eq(points::LIVE))
        .filter(points::Column::ExpireDate.is_not_null())
        .filter(points::Column::ExpireDate.lt(now))
        .exec(db)
        .await?;

    Ok(())
}

/// One step of a spend allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendStep {
    pub entry_id: i32,
    pub new_use_point: i64,
    pub exhausted: bool,
}

/// Allocates `amount` across unspent credits, oldest-expiring first.
/// Pure so the allocation order and exhaustion markers are testable.
pub fn plan_spend(entries: &[points::Model], amount: i64) -> Vec<SpendStep> {
    let mut remaining = amount.abs();
    let mut steps = Vec::new();
    for entry in entries {
        if remaining <= 0 {
            break;
        }
        let available = entry.remaining();
        if available > remaining {
            steps.push(SpendStep {
                entry_id: entry.id,
                new_use_point: entry.use_point + remaining,
                exhausted: false,
            });
            remaining = 0;
        } else {
            steps.push(SpendStep {
                entry_id: entry.id,
                new_use_point: entry.point,
                exhausted: true,
            });
            remaining -= available;
        }
    }
    steps
}

/// Walks non-expired, not-fully-used credits in expiry order and records
/// `amount` as consumed. Exhausted credits get the distinguished marker.
pub async fn consume(
    db: &DatabaseConnection,
    config: &Config,
    member_id: &str,
    amount: i64,
) -> Result<()> {
    consume_excluding(db, config, member_id, amount, None).await
}

async fn consume_excluding(
    db: &DatabaseConnection,
    config: &Config,
    member_id: &str,
    amount: i64,
    exclude_entry: Option<i32>,
) -> Result<()> {
    let mut query = points::Entity::find()
        .filter(points::Column::MemberId.eq(member_id))
        .filter(points::Column::Expired.eq(points::LIVE))
        .filter(points::Column::Point.gt(0))
        .filter(Expr::col(points::Column::Point).gt(Expr::col(points::Column::UsePoint)));
    if let Some(id) = exclude_entry {
        query = query.filter(points::Column::Id.ne(id));
    }
    query = if config.point_term > 0 {
        query
            .order_by_asc(points::Column::ExpireDate)
            .order_by_asc(points::Column::Id)
    } else {
        query.order_by_asc(points::Column::Id)
    };
    let entries = query.all(db).await?;

    for step in plan_spend(&entries, amount) {
        let mut update = points::Entity::update_many()
            .col_expr(points::Column::UsePoint, Expr::value(step.new_use_point));
        if step.exhausted {
            update = update.col_expr(points::Column::Expired, Expr::value(points::EXHAUSTED));
        }
        update
            .filter(points::Column::Id.eq(step.entry_id))
            .exec(db)
            .await?;
    }

    Ok(())
}

/// One step of a release (un-spend) walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseStep {
    pub entry_id: i32,
    pub new_use_point: i64,
    pub new_expired: i32,
}

/// Inverse of [`plan_spend`]: gives `amount` back to the most recently
/// charged credits. An exhausted entry whose expiry has not passed comes
/// back to life.
pub fn plan_release(entries: &[points::Model], amount: i64) -> Vec<ReleaseStep> {
    let now = Utc::now().naive_utc();
    let mut remaining = amount.abs();
    let mut steps = Vec::new();
    for entry in entries {
        if remaining <= 0 {
            break;
        }
        let revived = entry.expired == points::EXHAUSTED
            && entry.expire_date.map(|d| d >= now).unwrap_or(true);
        let new_expired = if revived { points::LIVE } else { entry.expired };

        if entry.use_point > remaining {
            steps.push(ReleaseStep {
                entry_id: entry.id,
                new_use_point: entry.use_point - remaining,
                new_expired,
            });
            remaining = 0;
        } else {
            steps.push(ReleaseStep {
                entry_id: entry.id,
                new_use_point: 0,
                new_expired,
            });
            remaining -= entry.use_point;
        }
    }
    steps
}

/// Releases previously-consumed points, newest charge first.
pub async fn release(
    db: &DatabaseConnection,
    config: &Config,
    member_id: &str,
    amount: i64,
) -> Result<()> {
    let mut query = points::Entity::find()
        .filter(points::Column::MemberId.eq(member_id))
        .filter(points::Column::Expired.ne(points::EXPIRED))
        .filter(points::Column::UsePoint.gt(0));
    query = if config.point_term > 0 {
        query
            .order_by_desc(points::Column::ExpireDate)
            .order_by_desc(points::Column::Id)
    } else {
        query.order_by_desc(points::Column::Id)
    };
    let entries = query.all(db).await?;

    for step in plan_release(&entries, amount) {
        points::Entity::update_many()
            .col_expr(points::Column::UsePoint, Expr::value(step.new_use_point))
            .col_expr(points::Column::Expired, Expr::value(step.new_expired))
            .filter(points::Column::Id.eq(step.entry_id))
            .exec(db)
            .await?;
    }

    Ok(())
}

/// Reverses the entry matching the idempotency key: undoes its consumption
/// side, deletes it, rewrites every later entry's running balance, and
/// resyncs the member's cached total. Returns false when no entry matches.
///
/// A reverse followed by a grant with the same key reproduces the balance
/// sequence as if the original grant had never happened.
pub async fn reverse(
    db: &DatabaseConnection,
    config: &Config,
    member_id: &str,
    rel: &RelKey,
) -> Result<bool> {
    if rel.is_empty() {
        return Ok(false);
    }

    let entry = points::Entity::find()
        .filter(points::Column::MemberId.eq(member_id))
        .filter(points::Column::RelTable.eq(rel.rel_table.as_str()))
        .filter(points::Column::RelId.eq(rel.rel_id.as_str()))
        .filter(points::Column::RelAction.eq(rel.rel_action.as_str()))
        .one(db)
        .await?;
    let entry = match entry {
        Some(entry) => entry,
        None => return Ok(false),
    };

    // A partially-consumed credit hands its spent share to other credits;
    // a debit gives back the consumption it caused when it was granted.
    if entry.use_point > 0 {
        consume_excluding(db, config, member_id, entry.use_point, Some(entry.id)).await?;
    }
    if entry.point < 0 {
        release(db, config, member_id, -entry.point).await?;
    }

    points::Entity::delete_by_id(entry.id).exec(db).await?;

    // Later snapshots still include the deleted delta; rewrite the chain.
    points::Entity::update_many()
        .col_expr(
            points::Column::MemberPoint,
            Expr::col(points::Column::MemberPoint).sub(entry.point),
        )
        .filter(points::Column::MemberId.eq(member_id))
        .filter(points::Column::Id.gt(entry.id))
        .exec(db)
        .await?;

    let total = sum_for_member(db, config, member_id).await?;
    members::Entity::update_many()
        .col_expr(members::Column::Point, Expr::value(total))
        .filter(members::Column::Id.eq(member_id))
        .exec(db)
        .await?;

    Ok(true)
}
