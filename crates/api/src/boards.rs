//! Board registry: which boards exist and how each one is configured.

use std::collections::HashMap;

use sumi_core::filters::default_rules;
use sumi_pipeline::config::BoardConfig;

use crate::config::ServerConfig;

const FLOOD_MESSAGE: &str = "Flood detected; wait before posting again.";

/// Per-board configuration, keyed by board URI.
#[derive(Default)]
pub struct BoardRegistry {
    boards: HashMap<String, BoardConfig>,
}

impl BoardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every configured board gets the stock three-window flood rules
    /// plus the instance-wide dedup scope.
    pub fn from_config(config: &ServerConfig) -> Self {
        let mut registry = Self::new();
        for board in &config.boards {
            registry.insert(
                board.clone(),
                BoardConfig {
                    filters: default_rules(
                        config.flood_time_secs,
                        config.flood_time_ip_secs,
                        config.flood_time_same_secs,
                        FLOOD_MESSAGE,
                    ),
                    dedup: config.dedup,
                    ..BoardConfig::default()
                },
            );
        }
        registry
    }

    pub fn insert(&mut self, board: String, config: BoardConfig) {
        self.boards.insert(board, config);
    }

    pub fn get(&self, board: &str) -> Option<&BoardConfig> {
        self.boards.get(board)
    }
}
