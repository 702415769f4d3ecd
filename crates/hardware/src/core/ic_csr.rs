//! CSR command interconnect: two masters, one slave.
//!
//! Execute and the debug port both issue CSR commands; this arbiter picks
//! one request at a time, remembers the owner with a ping-pong priority
//! bit, and steers the single response back to the master that issued the
//! command.

use super::csr::{CsrCommand, CsrResponse};

/// The two command masters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CsrMaster {
    /// The Execute stage.
    Exec,
    /// The debug port.
    Dbg,
}

/// The 2-master/1-slave arbiter.
pub struct CsrBus {
    owner: Option<CsrMaster>,
    /// Priority toggles after every grant so neither master starves.
    prefer_dbg: bool,
}

impl CsrBus {
    /// Creates an idle arbiter.
    pub fn new() -> Self {
        Self {
            owner: None,
            prefer_dbg: false,
        }
    }

    /// Arbitrates the two request ports.
    ///
    /// Returns the granted command, if any; the grant stays latched as
    /// the response owner until [`CsrBus::take_resp`] observes the
    /// response.
    pub fn grant(
        &mut self,
        exec_req: Option<CsrCommand>,
        dbg_req: Option<CsrCommand>,
        slave_ready: bool,
    ) -> Option<CsrCommand> {
        if self.owner.is_some() || !slave_ready {
            return None;
        }
        let pick = match (exec_req, dbg_req) {
            (Some(e), Some(d)) => {
                if self.prefer_dbg {
                    Some((CsrMaster::Dbg, d))
                } else {
                    Some((CsrMaster::Exec, e))
                }
            }
            (Some(e), None) => Some((CsrMaster::Exec, e)),
            (None, Some(d)) => Some((CsrMaster::Dbg, d)),
            (None, None) => None,
        };
        pick.map(|(m, cmd)| {
            self.owner = Some(m);
            self.prefer_dbg = m == CsrMaster::Exec;
            cmd
        })
    }

    /// Routes a response back to its owner and releases the bus.
    pub fn take_resp(&mut self, resp: Option<CsrResponse>) -> Option<(CsrMaster, CsrResponse)> {
        let resp = resp?;
        let owner = self.owner.take()?;
        Some((owner, resp))
    }

    /// The master currently owning the bus.
    pub fn owner(&self) -> Option<CsrMaster> {
        self.owner
    }
}

impl Default for CsrBus {
    fn default() -> Self {
        Self::new()
    }
}
