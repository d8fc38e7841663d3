/// This module contains the upkeep state database model.
pub mod upkeep_state;
