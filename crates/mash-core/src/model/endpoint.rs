// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Endpoint: a logical sub-device exposing an insertion-ordered set of
//! features, at most one per `FeatureType`.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{ModelError, Result};
use crate::model::feature::{Feature, FeatureType};

#[derive(Debug, Clone)]
pub struct EndpointInfo {
    pub id: u8,
    pub device_type: &'static str,
    pub display_name: String,
}

pub struct Endpoint {
    pub info: EndpointInfo,
    features: IndexMap<FeatureType, Arc<Feature>>,
}

impl Endpoint {
    pub fn new(info: EndpointInfo) -> Self {
        Self {
            info,
            features: IndexMap::new(),
        }
    }

    /// Features live behind an `Arc` from the moment they're mounted, so
    /// that subscriptions and the arbitration resolver (§4.7, §9) can hold
    /// a weak back-reference without the endpoint outliving its own tree.
    pub fn add_feature(&mut self, feature: Feature) -> Result<Arc<Feature>> {
        self.add_feature_arc(Arc::new(feature))
    }

    pub fn add_feature_arc(&mut self, feature: Arc<Feature>) -> Result<Arc<Feature>> {
        let ft = feature.feature_type;
        if self.features.contains_key(&ft) {
            return Err(ModelError::FeatureDuplicate(ft));
        }
        self.features.insert(ft, Arc::clone(&feature));
        Ok(feature)
    }

    pub fn get_feature(&self, ft: FeatureType) -> Result<Arc<Feature>> {
        self.features.get(&ft).cloned().ok_or(ModelError::FeatureNotFound(ft))
    }

    pub fn feature_types(&self) -> impl Iterator<Item = FeatureType> + '_ {
        self.features.keys().copied()
    }

    pub fn has_feature(&self, ft: FeatureType) -> bool {
        self.features.contains_key(&ft)
    }
}
