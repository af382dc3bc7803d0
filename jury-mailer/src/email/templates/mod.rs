//! Credential email template
//!
//! Templates use minijinja syntax (`{{ Name }}`) with HTML auto-escaping.
//! Available variables: `Name`, `BaseUrl`, `CodeLeft`, `CodeRight`, `Code`,
//! `AppName`. Referencing any other variable is a render error.

use crate::config::{keys, ConfigResolver};
use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

/// Number of code characters the template needs
pub const CODE_LENGTH: usize = 8;

const CODE_SPLIT: usize = CODE_LENGTH / 2;

/// Template error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// The template could not be loaded or is not valid template syntax
    #[error("failed to parse template: {0}")]
    Parse(String),

    #[error("failed to render template: {0}")]
    Render(String),

    #[error("credential code must be at least {CODE_LENGTH} characters, got {len}")]
    CodeTooShort { len: usize },
}

/// Where the template text comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    Inline(String),
    /// Read from disk on every render
    File(PathBuf),
}

impl TemplateSource {
    fn load(&self) -> Result<String, TemplateError> {
        match self {
            Self::Inline(source) => Ok(source.clone()),
            Self::File(path) => fs::read_to_string(path).map_err(|e| {
                TemplateError::Parse(format!("cannot read {}: {}", path.display(), e))
            }),
        }
    }
}

/// Substitution variables for the credential email
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CredentialVars<'a> {
    pub name: &'a str,
    pub base_url: &'a str,
    pub code_left: &'a str,
    pub code_right: &'a str,
    pub code: &'a str,
    pub app_name: &'a str,
}

impl<'a> CredentialVars<'a> {
    /// Split `code` into its two display halves: `code[0:4]` and `code[4:8]`.
    /// Codes shorter than [`CODE_LENGTH`] characters are rejected.
    pub fn new(
        name: &'a str,
        base_url: &'a str,
        code: &'a str,
        app_name: &'a str,
    ) -> Result<Self, TemplateError> {
        let len = code.chars().count();
        if len < CODE_LENGTH {
            return Err(TemplateError::CodeTooShort { len });
        }

        let mid = char_offset(code, CODE_SPLIT);
        let end = char_offset(code, CODE_LENGTH);

        Ok(Self {
            name,
            base_url,
            code_left: &code[..mid],
            code_right: &code[mid..end],
            code,
            app_name,
        })
    }
}

/// Byte offset of the `n`th character; `n` must not exceed the char count
fn char_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

/// Renders the credential email body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRenderer {
    source: TemplateSource,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateRenderer {
    pub fn new(source: TemplateSource) -> Self {
        Self { source }
    }

    pub fn inline(source: impl Into<String>) -> Self {
        Self::new(TemplateSource::Inline(source.into()))
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self::new(TemplateSource::File(path.into()))
    }

    /// The template shipped with the crate
    pub fn builtin() -> Self {
        Self::inline(CREDENTIAL_TEMPLATE)
    }

    /// `EMAIL_TEMPLATE_PATH` when set, otherwise the built-in template
    pub fn from_config(config: &ConfigResolver) -> Self {
        match config.get(keys::EMAIL_TEMPLATE_PATH) {
            Some(path) => Self::from_file(path),
            None => Self::builtin(),
        }
    }

    /// Render a template with the given variables
    pub fn render(&self, vars: &CredentialVars<'_>) -> Result<String, TemplateError> {
        let source = self.source.load()?;

        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_auto_escape_callback(|_| AutoEscape::Html);

        let template = env
            .template_from_str(&source)
            .map_err(|e| TemplateError::Parse(e.to_string()))?;

        template
            .render(vars)
            .map_err(|e| TemplateError::Render(e.to_string()))
    }

    /// Split the code and render in one step
    pub fn render_credential(
        &self,
        name: &str,
        base_url: &str,
        code: &str,
        app_name: &str,
    ) -> Result<String, TemplateError> {
        let vars = CredentialVars::new(name, base_url, code, app_name)?;
        self.render(&vars)
    }
}

// ============================================================================
// Email Templates
// ============================================================================

pub const CREDENTIAL_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{{ AppName }} Judging</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Helvetica, Arial, sans-serif; line-height: 1.6; color: #333; margin: 0; padding: 0; background-color: #f5f5f5; }
        .container { max-width: 600px; margin: 40px auto; padding: 40px; background: #ffffff; border-radius: 8px; box-shadow: 0 2px 4px rgba(0,0,0,0.1); }
        .header { text-align: center; margin-bottom: 30px; }
        .header h1 { color: #2563eb; margin: 0; font-size: 24px; }
        .code { text-align: center; font-family: 'SFMono-Regular', Consolas, monospace; font-size: 32px; letter-spacing: 4px; margin: 30px 0; }
        .code span { display: inline-block; background-color: #eff6ff; border: 1px solid #bfdbfe; border-radius: 6px; padding: 8px 16px; margin: 0 6px; }
        .button { display: inline-block; background-color: #2563eb; color: #ffffff; padding: 14px 28px; text-decoration: none; border-radius: 6px; font-weight: 600; }
        .footer { text-align: center; font-size: 12px; color: #666; margin-top: 30px; padding-top: 20px; border-top: 1px solid #eee; }
        .link { color: #2563eb; word-break: break-all; }
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>{{ AppName }}</h1>
        </div>
        <div class="content">
            <p>Hi {{ Name }},</p>
            <p>You have been added as a judge for <strong>{{ AppName }}</strong>. Use the code below to log in:</p>
            <div class="code"><span>{{ CodeLeft }}</span><span>{{ CodeRight }}</span></div>
            <p style="text-align: center; margin: 30px 0;">
                <a href="{{ BaseUrl }}/judge/login?code={{ Code }}" class="button">Start Judging</a>
            </p>
            <p style="font-size: 14px; color: #666;">
                Or go to <a href="{{ BaseUrl }}/judge/login" class="link">{{ BaseUrl }}/judge/login</a> and enter your code.
            </p>
        </div>
        <div class="footer">
            <p>Do not share this code. Anyone with it can submit scores in your name.</p>
            <p>{{ AppName }} &middot; Jury Judging Platform</p>
        </div>
    </div>
</body>
</html>"#;
