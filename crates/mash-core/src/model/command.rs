// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Command metadata and handler dispatch.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ModelError, Result};
use crate::value::{SemanticType, Value};
use crate::zone::RequestContext;

#[derive(Debug, Clone)]
pub struct ParamDef {
    pub name: &'static str,
    pub ty: SemanticType,
    pub required: bool,
}

impl ParamDef {
    pub fn required(name: &'static str, ty: SemanticType) -> Self {
        Self { name, ty, required: true }
    }

    pub fn optional(name: &'static str, ty: SemanticType) -> Self {
        Self { name, ty, required: false }
    }
}

pub type CommandResult = std::result::Result<BTreeMap<String, Value>, String>;

pub type HandlerFn =
    dyn Fn(&BTreeMap<String, Value>, &RequestContext) -> CommandResult + Send + Sync;

/// A command's metadata plus the closure that executes it. Handlers must
/// fully commit or fully roll back before returning (§5 cancellation
/// guarantee); no half-applied side effects.
#[derive(Clone)]
pub struct Command {
    pub id: u8,
    pub name: &'static str,
    pub params: Vec<ParamDef>,
    handler: Arc<HandlerFn>,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

impl Command {
    pub fn new<F>(id: u8, name: &'static str, params: Vec<ParamDef>, handler: F) -> Self
    where
        F: Fn(&BTreeMap<String, Value>, &RequestContext) -> CommandResult + Send + Sync + 'static,
    {
        Self {
            id,
            name,
            params,
            handler: Arc::new(handler),
        }
    }

    fn validate_params(&self, params: &BTreeMap<String, Value>) -> Result<()> {
        for p in &self.params {
            if p.required && !params.contains_key(p.name) {
                return Err(ModelError::InvalidParameters(self.id));
            }
        }
        Ok(())
    }

    pub fn invoke(
        &self,
        params: &BTreeMap<String, Value>,
        ctx: &RequestContext,
    ) -> Result<BTreeMap<String, Value>> {
        self.validate_params(params)?;
        (self.handler)(params, ctx).map_err(|msg| ModelError::CommandFailed(self.id, msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_param_rejected() {
        let cmd = Command::new(
            1,
            "SetLimit",
            vec![ParamDef::required("limit", SemanticType::U32)],
            |_params, _ctx| Ok(BTreeMap::new()),
        );
        let ctx = RequestContext::default();
        assert_eq!(
            cmd.invoke(&BTreeMap::new(), &ctx),
            Err(ModelError::InvalidParameters(1))
        );
    }

    #[test]
    fn handler_error_is_mapped() {
        let cmd = Command::new(2, "Fail", vec![], |_p, _c| Err("boom".to_string()));
        let ctx = RequestContext::default();
        assert_eq!(
            cmd.invoke(&BTreeMap::new(), &ctx),
            Err(ModelError::CommandFailed(2, "boom".to_string()))
        );
    }
}
