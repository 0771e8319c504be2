use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Body, Method, Request, Url};

use crate::error::TargetError;

/// One HTTP request description. Immutable once yielded by a
/// [`Targeter`]; consumed exactly once by one worker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Target {
    pub method: String,
    pub url: String,
    pub body: Bytes,
    pub header: HeaderMap,
}

impl Target {
    /// Builds the wire request. The body is attached from the shared byte
    /// buffer, so redirected requests re-send the same bytes without the
    /// caller supplying a fresh reader.
    pub(crate) fn request(&self) -> Result<Request, TargetError> {
        let method =
            Method::from_bytes(self.method.as_bytes()).map_err(|err| TargetError::InvalidMethod {
                method: self.method.clone(),
                source: err,
            })?;
        let url = Url::parse(&self.url).map_err(|err| TargetError::InvalidUrl {
            url: self.url.clone(),
            source: err,
        })?;

        let mut request = Request::new(method, url);
        *request.headers_mut() = self.header.clone();
        if !self.body.is_empty() {
            *request.body_mut() = Some(Body::from(self.body.clone()));
        }
        Ok(request)
    }
}

/// Source of work for an attack. `fill` either fills the slot and returns
/// `Ok`, or returns an error that is terminal for the whole attack.
///
/// Implementations may be called concurrently from every worker and must be
/// internally synchronized if they hold state.
pub trait Targeter: Send + Sync {
    fn fill(&self, target: &mut Target) -> Result<(), TargetError>;
}

impl<F> Targeter for F
where
    F: Fn(&mut Target) -> Result<(), TargetError> + Send + Sync,
{
    fn fill(&self, target: &mut Target) -> Result<(), TargetError> {
        self(target)
    }
}

/// Round-robin targeter over a fixed list.
#[derive(Debug)]
pub struct StaticTargeter {
    targets: Vec<Target>,
    cursor: AtomicUsize,
}

impl StaticTargeter {
    #[must_use]
    pub const fn new(targets: Vec<Target>) -> Self {
        Self {
            targets,
            cursor: AtomicUsize::new(0),
        }
    }
}

impl Targeter for StaticTargeter {
    fn fill(&self, target: &mut Target) -> Result<(), TargetError> {
        if self.targets.is_empty() {
            return Err(TargetError::NoTargets);
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed);
        let selected = idx.rem_euclid(self.targets.len());
        match self.targets.get(selected) {
            Some(next) => {
                *target = next.clone();
                Ok(())
            }
            None => Err(TargetError::NoTargets),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_target(url: &str) -> Target {
        Target {
            method: "GET".to_owned(),
            url: url.to_owned(),
            ..Target::default()
        }
    }

    #[test]
    fn request_carries_method_headers_and_body() -> Result<(), String> {
        let mut target = get_target("http://127.0.0.1:9999/path");
        target.method = "POST".to_owned();
        target.body = Bytes::from_static(b"payload");
        target
            .header
            .insert("x-probe", "1".parse().map_err(|_| "header value")?);

        let request = target
            .request()
            .map_err(|err| format!("build failed: {}", err))?;
        if request.method() != Method::POST {
            return Err("method mismatch".to_owned());
        }
        if !request.headers().contains_key("x-probe") {
            return Err("header lost".to_owned());
        }
        if request.body().is_none() {
            return Err("body lost".to_owned());
        }
        Ok(())
    }

    #[test]
    fn empty_body_is_not_attached() -> Result<(), String> {
        let request = get_target("http://127.0.0.1:9999/")
            .request()
            .map_err(|err| format!("build failed: {}", err))?;
        if request.body().is_some() {
            return Err("unexpected body".to_owned());
        }
        Ok(())
    }

    #[test]
    fn invalid_method_and_url_are_rejected() -> Result<(), String> {
        let mut target = get_target("http://127.0.0.1:9999/");
        target.method = "BAD METHOD".to_owned();
        if !matches!(target.request(), Err(TargetError::InvalidMethod { .. })) {
            return Err("expected method error".to_owned());
        }

        let target = get_target("http://");
        if !matches!(target.request(), Err(TargetError::InvalidUrl { .. })) {
            return Err("expected URL error".to_owned());
        }
        Ok(())
    }

    #[test]
    fn static_targeter_cycles_in_order() -> Result<(), String> {
        let targeter = StaticTargeter::new(vec![
            get_target("http://a.test/"),
            get_target("http://b.test/"),
        ]);
        let mut seen = Vec::new();
        for _ in 0..4 {
            let mut slot = Target::default();
            targeter
                .fill(&mut slot)
                .map_err(|err| format!("fill failed: {}", err))?;
            seen.push(slot.url);
        }
        if seen != ["http://a.test/", "http://b.test/", "http://a.test/", "http://b.test/"] {
            return Err(format!("unexpected order: {:?}", seen));
        }
        Ok(())
    }

    #[test]
    fn empty_static_targeter_reports_no_targets() -> Result<(), String> {
        let targeter = StaticTargeter::new(Vec::new());
        let mut slot = Target::default();
        match targeter.fill(&mut slot) {
            Err(TargetError::NoTargets) => Ok(()),
            other => Err(format!("unexpected: {:?}", other.err())),
        }
    }

    #[test]
    fn closures_are_targeters() -> Result<(), String> {
        let targeter = |target: &mut Target| {
            target.method = "GET".to_owned();
            target.url = "http://c.test/".to_owned();
            Ok(())
        };
        let mut slot = Target::default();
        Targeter::fill(&targeter, &mut slot).map_err(|err| format!("fill failed: {}", err))?;
        if slot.url != "http://c.test/" {
            return Err("closure did not fill slot".to_owned());
        }
        Ok(())
    }
}
