//! Giving way to units that need to pass

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::battle::facing::{give_way_fan, Facing};
use crate::battle::states::BodyState;
use crate::battle::unit::BattleUnit;
use crate::core::types::TilePos;

/// How a blocking unit could clear the way
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GiveWayRequest {
    /// Get up from prone so the legs tile frees up
    Kneel,
    /// Step one tile in this direction and come back
    Step(Facing),
}

impl BattleUnit {
    /// Record the ways this unit could let `requestor` pass
    ///
    /// Ignored while the unit has orders of its own or already holds
    /// requests. Candidate steps avoid the requestor's tile and every tile of
    /// its planned path; they are checked for walkability only when acted on.
    pub fn request_give_way(&mut self, requestor: TilePos, planned_path: &[TilePos], at: TilePos) {
        if !self.give_way_requests.is_empty() || self.is_busy() {
            return;
        }

        // A prone unit blocks with its legs, not its own tile
        if self.current_body_state == BodyState::Prone && at != self.tile() {
            self.give_way_requests.push(GiveWayRequest::Kneel);
            debug!(unit = %self.id, "asked to kneel to give way");
            return;
        }

        let here = self.tile();
        for facing in give_way_fan(self.facing) {
            let step = here + facing.offset().extend(0);
            if step == requestor || planned_path.contains(&step) {
                continue;
            }
            self.give_way_requests.push(GiveWayRequest::Step(facing));
        }
        debug!(unit = %self.id, options = self.give_way_requests.len(), "asked to give way");
    }
}
