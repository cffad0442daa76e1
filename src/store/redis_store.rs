//! Redis-backed store
//!
//! One synchronous connection guarded by a mutex. Conditional maximum is
//! delegated to `ZADD GT` (Redis 6.2+), so concurrent writers converge
//! without a read-modify-write race.

use super::RankStore;
use crate::error::{RankError, Result};
use parking_lot::Mutex;

impl From<redis::RedisError> for RankError {
    fn from(e: redis::RedisError) -> Self {
        RankError::BackingStoreUnavailable(e.to_string())
    }
}

/// [`RankStore`] over a Redis server
pub struct RedisStore {
    conn: Mutex<redis::Connection>,
}

impl RedisStore {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379/15`)
    pub fn open(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection()?;
        Ok(RedisStore {
            conn: Mutex::new(conn),
        })
    }

    fn query<T: redis::FromRedisValue>(&self, cmd: &redis::Cmd) -> Result<T> {
        let mut conn = self.conn.lock();
        Ok(cmd.query(&mut *conn)?)
    }
}

impl RankStore for RedisStore {
    fn score(&self, bucket: &str, member: &str) -> Result<Option<f64>> {
        self.query(redis::cmd("ZSCORE").arg(bucket).arg(member))
    }

    fn set_score(&self, bucket: &str, member: &str, score: f64) -> Result<()> {
        self.query::<i64>(redis::cmd("ZADD").arg(bucket).arg(score).arg(member))?;
        Ok(())
    }

    fn max_score(&self, bucket: &str, member: &str, score: f64) -> Result<bool> {
        let changed: i64 = self.query(
            redis::cmd("ZADD")
                .arg(bucket)
                .arg("GT")
                .arg("CH")
                .arg(score)
                .arg(member),
        )?;
        Ok(changed > 0)
    }

    fn range_desc(&self, bucket: &str) -> Result<Vec<(String, f64)>> {
        self.query(
            redis::cmd("ZREVRANGE")
                .arg(bucket)
                .arg(0)
                .arg(-1)
                .arg("WITHSCORES"),
        )
    }

    fn members(&self, bucket: &str) -> Result<Vec<String>> {
        self.query(redis::cmd("ZREVRANGE").arg(bucket).arg(0).arg(-1))
    }

    fn expire(&self, key: &str, seconds: u64) -> Result<()> {
        self.query::<i64>(redis::cmd("EXPIRE").arg(key).arg(seconds))?;
        Ok(())
    }

    fn ttl(&self, key: &str) -> Result<Option<u64>> {
        let ttl: i64 = self.query(redis::cmd("TTL").arg(key))?;
        // -2: missing, -1: no expiry
        Ok(u64::try_from(ttl).ok())
    }

    fn incr(&self, key: &str) -> Result<i64> {
        self.query(redis::cmd("INCR").arg(key))
    }

    fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let added: i64 = self.query(redis::cmd("SADD").arg(key).arg(member))?;
        Ok(added > 0)
    }

    fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let mut members: Vec<String> = self.query(redis::cmd("SMEMBERS").arg(key))?;
        members.sort();
        Ok(members)
    }

    fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.query::<i64>(redis::cmd("HSET").arg(key).arg(field).arg(value))?;
        Ok(())
    }

    fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.query(redis::cmd("HGET").arg(key).arg(field))
    }

    fn hash_get_all(&self, key: &str) -> Result<Vec<(String, String)>> {
        let mut fields: Vec<(String, String)> = self.query(redis::cmd("HGETALL").arg(key))?;
        fields.sort();
        Ok(fields)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.query(redis::cmd("KEYS").arg("*"))?;
        keys.sort();
        Ok(keys)
    }
}
