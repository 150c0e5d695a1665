use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    error::Result,
    models::{
        CommentRef, NewPoll, Poll, PollOption, PostRef, ReactionTally, ReactionTarget,
        ReactionType, Side, SideTally, TargetKind,
    },
};

use super::{RowLock, VoteStore, VoteTx};

const POLL_COLUMNS: &str =
    "id, post_id, allow_multiple, max_choices, ends_at, total_votes, created_at";

fn lock_clause(lock: RowLock) -> &'static str {
    match lock {
        RowLock::Update => "FOR UPDATE",
        RowLock::Share => "FOR SHARE",
    }
}

/// Ledger backed by PostgreSQL.
#[derive(Clone)]
pub struct PgVoteStore {
    db: PgPool,
}

impl PgVoteStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VoteStore for PgVoteStore {
    type Tx = PgVoteTx;

    async fn begin(&self) -> Result<PgVoteTx> {
        let tx = self.db.begin().await?;
        Ok(PgVoteTx { tx })
    }
}

/// One database transaction. Dropping it without `commit` rolls back.
pub struct PgVoteTx {
    tx: Transaction<'static, Postgres>,
}

// Table and column names per reaction target. Identifiers cannot be bound, so each kind gets
// its own fixed statements.
struct ReactionSql {
    find: &'static str,
    insert: &'static str,
    update: &'static str,
    delete: &'static str,
    count: &'static str,
    stored: &'static str,
    write: &'static str,
}

const POST_REACTIONS: ReactionSql = ReactionSql {
    find: "SELECT reaction_type FROM post_reactions WHERE user_id = $1 AND post_id = $2",
    insert: r#"
        INSERT INTO post_reactions (id, user_id, post_id, reaction_type, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $5)
        "#,
    update: r#"
        UPDATE post_reactions SET reaction_type = $3, updated_at = $4
        WHERE user_id = $1 AND post_id = $2
        "#,
    delete: "DELETE FROM post_reactions WHERE user_id = $1 AND post_id = $2",
    count: r#"
        SELECT
            COUNT(*) FILTER (WHERE reaction_type = 'upvote')::int AS upvotes,
            COUNT(*) FILTER (WHERE reaction_type = 'downvote')::int AS downvotes
        FROM post_reactions
        WHERE post_id = $1
        "#,
    stored: "SELECT upvotes, downvotes FROM posts WHERE id = $1",
    write: "UPDATE posts SET upvotes = $2, downvotes = $3, updated_at = $4 WHERE id = $1",
};

const COMMENT_REACTIONS: ReactionSql = ReactionSql {
    find: "SELECT reaction_type FROM comment_reactions WHERE user_id = $1 AND comment_id = $2",
    insert: r#"
        INSERT INTO comment_reactions (id, user_id, comment_id, reaction_type, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $5)
        "#,
    update: r#"
        UPDATE comment_reactions SET reaction_type = $3, updated_at = $4
        WHERE user_id = $1 AND comment_id = $2
        "#,
    delete: "DELETE FROM comment_reactions WHERE user_id = $1 AND comment_id = $2",
    count: r#"
        SELECT
            COUNT(*) FILTER (WHERE reaction_type = 'upvote')::int AS upvotes,
            COUNT(*) FILTER (WHERE reaction_type = 'downvote')::int AS downvotes
        FROM comment_reactions
        WHERE comment_id = $1
        "#,
    stored: "SELECT upvotes, downvotes FROM comments WHERE id = $1",
    write: "UPDATE comments SET upvotes = $2, downvotes = $3, updated_at = $4 WHERE id = $1",
};

fn reaction_sql(kind: TargetKind) -> &'static ReactionSql {
    match kind {
        TargetKind::Post => &POST_REACTIONS,
        TargetKind::Comment => &COMMENT_REACTIONS,
    }
}

#[async_trait]
impl VoteTx for PgVoteTx {
    async fn lock_post(&mut self, post_id: Uuid, lock: RowLock) -> Result<Option<PostRef>> {
        let sql = format!(
            "SELECT id, post_type, status FROM posts WHERE id = $1 {}",
            lock_clause(lock)
        );
        let post = sqlx::query_as::<_, PostRef>(&sql)
            .bind(post_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(post)
    }

    async fn lock_comment(
        &mut self,
        comment_id: Uuid,
        lock: RowLock,
    ) -> Result<Option<CommentRef>> {
        let sql = format!(
            "SELECT id, post_id, status FROM comments WHERE id = $1 {}",
            lock_clause(lock)
        );
        let comment = sqlx::query_as::<_, CommentRef>(&sql)
            .bind(comment_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(comment)
    }

    async fn lock_poll(&mut self, poll_id: Uuid, lock: RowLock) -> Result<Option<Poll>> {
        let sql = format!(
            "SELECT {} FROM polls WHERE id = $1 {}",
            POLL_COLUMNS,
            lock_clause(lock)
        );
        let poll = sqlx::query_as::<_, Poll>(&sql)
            .bind(poll_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(poll)
    }

    async fn find_poll_for_post(&mut self, post_id: Uuid) -> Result<Option<Poll>> {
        let sql = format!("SELECT {} FROM polls WHERE post_id = $1", POLL_COLUMNS);
        let poll = sqlx::query_as::<_, Poll>(&sql)
            .bind(post_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(poll)
    }

    async fn poll_options(&mut self, poll_id: Uuid) -> Result<Vec<PollOption>> {
        let options = sqlx::query_as::<_, PollOption>(
            r#"
            SELECT id, poll_id, text, position, vote_count
            FROM poll_options
            WHERE poll_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(poll_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(options)
    }

    async fn find_reaction(
        &mut self,
        user_id: Uuid,
        target: ReactionTarget,
    ) -> Result<Option<ReactionType>> {
        let reaction = sqlx::query_scalar::<_, ReactionType>(reaction_sql(target.kind).find)
            .bind(user_id)
            .bind(target.id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(reaction)
    }

    async fn insert_reaction(
        &mut self,
        user_id: Uuid,
        target: ReactionTarget,
        reaction_type: ReactionType,
    ) -> Result<()> {
        sqlx::query(reaction_sql(target.kind).insert)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(target.id)
            .bind(reaction_type)
            .bind(Utc::now())
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn update_reaction(
        &mut self,
        user_id: Uuid,
        target: ReactionTarget,
        reaction_type: ReactionType,
    ) -> Result<()> {
        sqlx::query(reaction_sql(target.kind).update)
            .bind(user_id)
            .bind(target.id)
            .bind(reaction_type)
            .bind(Utc::now())
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn delete_reaction(&mut self, user_id: Uuid, target: ReactionTarget) -> Result<()> {
        sqlx::query(reaction_sql(target.kind).delete)
            .bind(user_id)
            .bind(target.id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn count_reactions(&mut self, target: ReactionTarget) -> Result<ReactionTally> {
        let tally = sqlx::query_as::<_, ReactionTally>(reaction_sql(target.kind).count)
            .bind(target.id)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(tally)
    }

    async fn stored_reaction_counts(&mut self, target: ReactionTarget) -> Result<ReactionTally> {
        let tally = sqlx::query_as::<_, ReactionTally>(reaction_sql(target.kind).stored)
            .bind(target.id)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(tally)
    }

    async fn write_reaction_counts(
        &mut self,
        target: ReactionTarget,
        tally: ReactionTally,
    ) -> Result<()> {
        sqlx::query(reaction_sql(target.kind).write)
            .bind(target.id)
            .bind(tally.upvotes)
            .bind(tally.downvotes)
            .bind(Utc::now())
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn find_side_vote(&mut self, user_id: Uuid, post_id: Uuid) -> Result<Option<Side>> {
        let side = sqlx::query_scalar::<_, Side>(
            "SELECT side FROM side_votes WHERE user_id = $1 AND post_id = $2",
        )
        .bind(user_id)
        .bind(post_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(side)
    }

    async fn insert_side_vote(&mut self, user_id: Uuid, post_id: Uuid, side: Side) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO side_votes (id, user_id, post_id, side, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(post_id)
        .bind(side)
        .bind(Utc::now())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn update_side_vote(&mut self, user_id: Uuid, post_id: Uuid, side: Side) -> Result<()> {
        sqlx::query(
            "UPDATE side_votes SET side = $3, updated_at = $4 WHERE user_id = $1 AND post_id = $2",
        )
        .bind(user_id)
        .bind(post_id)
        .bind(side)
        .bind(Utc::now())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn delete_side_vote(&mut self, user_id: Uuid, post_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM side_votes WHERE user_id = $1 AND post_id = $2")
            .bind(user_id)
            .bind(post_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn count_side_votes(&mut self, post_id: Uuid) -> Result<SideTally> {
        let tally = sqlx::query_as::<_, SideTally>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE side = 'A')::int AS votes_a,
                COUNT(*) FILTER (WHERE side = 'B')::int AS votes_b
            FROM side_votes
            WHERE post_id = $1
            "#,
        )
        .bind(post_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(tally)
    }

    async fn stored_side_counts(&mut self, post_id: Uuid) -> Result<SideTally> {
        let tally =
            sqlx::query_as::<_, SideTally>("SELECT votes_a, votes_b FROM posts WHERE id = $1")
                .bind(post_id)
                .fetch_one(&mut *self.tx)
                .await?;

        Ok(tally)
    }

    async fn write_side_counts(&mut self, post_id: Uuid, tally: SideTally) -> Result<()> {
        sqlx::query("UPDATE posts SET votes_a = $2, votes_b = $3, updated_at = $4 WHERE id = $1")
            .bind(post_id)
            .bind(tally.votes_a)
            .bind(tally.votes_b)
            .bind(Utc::now())
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn insert_poll(&mut self, new_poll: &NewPoll) -> Result<()> {
        let poll = &new_poll.poll;
        sqlx::query(
            r#"
            INSERT INTO polls (id, post_id, allow_multiple, max_choices, ends_at, total_votes, created_at)
            VALUES ($1, $2, $3, $4, $5, 0, $6)
            "#,
        )
        .bind(poll.id)
        .bind(poll.post_id)
        .bind(poll.allow_multiple)
        .bind(poll.max_choices)
        .bind(poll.ends_at)
        .bind(poll.created_at)
        .execute(&mut *self.tx)
        .await?;

        for option in &new_poll.options {
            sqlx::query(
                r#"
                INSERT INTO poll_options (id, poll_id, text, position, vote_count)
                VALUES ($1, $2, $3, $4, 0)
                "#,
            )
            .bind(option.id)
            .bind(poll.id)
            .bind(&option.text)
            .bind(option.position)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn poll_selection(&mut self, user_id: Uuid, poll_id: Uuid) -> Result<Vec<Uuid>> {
        let option_ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT v.option_id
            FROM poll_votes v
            JOIN poll_options o ON o.id = v.option_id
            WHERE v.user_id = $1 AND v.poll_id = $2
            ORDER BY o.position ASC
            "#,
        )
        .bind(user_id)
        .bind(poll_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(option_ids)
    }

    async fn clear_poll_votes(&mut self, user_id: Uuid, poll_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM poll_votes WHERE user_id = $1 AND poll_id = $2")
            .bind(user_id)
            .bind(poll_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn insert_poll_vote(
        &mut self,
        user_id: Uuid,
        poll_id: Uuid,
        option_id: Uuid,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO poll_votes (id, user_id, poll_id, option_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(poll_id)
        .bind(option_id)
        .bind(Utc::now())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn count_option_votes(&mut self, poll_id: Uuid) -> Result<Vec<(Uuid, i32)>> {
        let counts = sqlx::query_as::<_, (Uuid, i32)>(
            r#"
            SELECT o.id, COUNT(v.id)::int
            FROM poll_options o
            LEFT JOIN poll_votes v ON v.option_id = o.id
            WHERE o.poll_id = $1
            GROUP BY o.id, o.position
            ORDER BY o.position ASC
            "#,
        )
        .bind(poll_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(counts)
    }

    async fn count_poll_votes(&mut self, poll_id: Uuid) -> Result<i32> {
        let total =
            sqlx::query_scalar::<_, i32>("SELECT COUNT(*)::int FROM poll_votes WHERE poll_id = $1")
                .bind(poll_id)
                .fetch_one(&mut *self.tx)
                .await?;

        Ok(total)
    }

    async fn write_option_count(&mut self, option_id: Uuid, vote_count: i32) -> Result<()> {
        sqlx::query("UPDATE poll_options SET vote_count = $2 WHERE id = $1")
            .bind(option_id)
            .bind(vote_count)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn write_poll_total(&mut self, poll_id: Uuid, total_votes: i32) -> Result<()> {
        sqlx::query("UPDATE polls SET total_votes = $2 WHERE id = $1")
            .bind(poll_id)
            .bind(total_votes)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
