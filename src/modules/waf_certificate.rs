//! `waf_certificate`: upload or remove a WAF certificate
//!
//! Certificates cannot be modified once uploaded. When the remote reports
//! the certificate body, a different `content` is a conflict.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::args::{ArgSpec, ArgumentSpec, Params};
use crate::envelope::Outcome;
use crate::error::{ModuleError, Result};
use crate::module::{resource_id, run_stateful, state_param, Module, ModuleContext};
use crate::reconcile::{Attribute, ResourceAdapter};
use crate::services::Session;

const FROZEN: &[Attribute] = &[Attribute::scalar("content", "content")];

pub struct WafCertificate;

#[async_trait]
impl Module for WafCertificate {
    fn name(&self) -> &'static str {
        "waf_certificate"
    }

    fn argument_spec(&self) -> ArgumentSpec {
        ArgumentSpec::new()
            .param("name", ArgSpec::str().required())
            .param("content", ArgSpec::str())
            .param("private_key", ArgSpec::str().sensitive())
            .param("state", state_param())
            .required_if("state", "present", &["content", "private_key"])
    }

    async fn run(&self, ctx: &ModuleContext) -> Result<Outcome> {
        let adapter = CertificateAdapter {
            params: &ctx.params,
            session: &ctx.session,
            name: ctx.params.get_str("name").unwrap_or_default(),
        };
        run_stateful(ctx, &adapter).await
    }
}

struct CertificateAdapter<'a> {
    params: &'a Params,
    session: &'a Session,
    name: &'a str,
}

#[async_trait]
impl<'a> ResourceAdapter for CertificateAdapter<'a> {
    fn kind(&self) -> &'static str {
        "waf_certificate"
    }

    fn identity(&self) -> &str {
        self.name
    }

    fn non_updatable(&self) -> &'static [Attribute] {
        FROZEN
    }

    fn supports_update(&self) -> bool {
        false
    }

    async fn find(&self) -> Result<Option<Value>> {
        Ok(self.session.waf.find_certificate(self.name).await?)
    }

    async fn creation_bundle(&self) -> Result<Value> {
        Ok(json!({
            "name": self.name,
            "content": self.params.get_str("content").map(str::trim),
        }))
    }

    async fn create(&self, bundle: &Value) -> Result<Value> {
        let key = self
            .params
            .secret("private_key")
            .and_then(|s| s.expose().as_str())
            .ok_or_else(|| ModuleError::invalid("private_key is required to upload a certificate"))?;

        let mut request = bundle.clone();
        request["key"] = json!(key.trim());
        Ok(self.session.waf.create_certificate(request).await?)
    }

    async fn delete(&self, existing: &Value) -> Result<()> {
        let id = resource_id(existing)
            .ok_or_else(|| ModuleError::internal("waf certificate without id"))?;
        Ok(self.session.waf.delete_certificate(id).await?)
    }

    async fn refresh(&self, resource: &Value) -> Result<Option<Value>> {
        match resource_id(resource) {
            Some(id) => Ok(self.session.waf.find_certificate(id).await?),
            None => Ok(None),
        }
    }
}
