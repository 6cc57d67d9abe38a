use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use crate::guard::{AccountState, OpenPosition};
use crate::signal::Bias;

/// Durable risk state. The kill-switch latch and cool-off window must
/// survive a restart; a process bounce must never reopen trading that the
/// latches closed.
pub struct StateStore {
    conn: Connection,
}

impl StateStore {
    pub fn new(path: &str) -> Result<Self> {
        Ok(Self { conn: Connection::open(path)? })
    }

    pub fn init(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS risk_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                peak_nav REAL NOT NULL,
                current_nav REAL NOT NULL,
                session_profit REAL NOT NULL,
                session_profit_peak REAL NOT NULL,
                house_profit REAL NOT NULL,
                loss_streak INTEGER NOT NULL,
                cool_off_until INTEGER NOT NULL,
                kill_switch_active INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS open_positions (
                pair TEXT NOT NULL,
                direction TEXT NOT NULL,
                units REAL NOT NULL
            );
            COMMIT;",
        )?;
        Ok(())
    }

    /// Overwrite the single risk-state row and the position set atomically.
    pub fn save(&mut self, state: &AccountState) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO risk_state
             (id, peak_nav, current_nav, session_profit, session_profit_peak,
              house_profit, loss_streak, cool_off_until, kill_switch_active)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                state.peak_nav,
                state.current_nav,
                state.session_profit,
                state.session_profit_peak,
                state.house_profit,
                state.loss_streak as i64,
                state.cool_off_until as i64,
                state.kill_switch_active as i64,
            ],
        )?;
        tx.execute("DELETE FROM open_positions", [])?;
        for pos in &state.open_positions {
            tx.execute(
                "INSERT INTO open_positions (pair, direction, units) VALUES (?1, ?2, ?3)",
                params![pos.pair, pos.direction.as_str(), pos.units],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Load the persisted state, or None on first run.
    pub fn load(&self) -> Result<Option<AccountState>> {
        let row = self
            .conn
            .query_row(
                "SELECT peak_nav, current_nav, session_profit, session_profit_peak,
                        house_profit, loss_streak, cool_off_until, kill_switch_active
                 FROM risk_state WHERE id = 1",
                [],
                |row| {
                    Ok(AccountState {
                        peak_nav: row.get(0)?,
                        current_nav: row.get(1)?,
                        session_profit: row.get(2)?,
                        session_profit_peak: row.get(3)?,
                        house_profit: row.get(4)?,
                        loss_streak: row.get::<_, i64>(5)? as u32,
                        cool_off_until: row.get::<_, i64>(6)? as u64,
                        kill_switch_active: row.get::<_, i64>(7)? != 0,
                        open_positions: Vec::new(),
                    })
                },
            )
            .optional()?;

        let mut state = match row {
            Some(state) => state,
            None => return Ok(None),
        };

        let mut stmt = self
            .conn
            .prepare("SELECT pair, direction, units FROM open_positions")?;
        let positions = stmt.query_map([], |row| {
            let direction: String = row.get(1)?;
            Ok(OpenPosition {
                pair: row.get(0)?,
                direction: match direction.as_str() {
                    "long" => Bias::Long,
                    "short" => Bias::Short,
                    _ => Bias::Neutral,
                },
                units: row.get(2)?,
            })
        })?;
        for pos in positions {
            state.open_positions.push(pos?);
        }
        Ok(Some(state))
    }
}
