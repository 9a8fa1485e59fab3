//! Proprietary marker catalog.
//!
//! A [`ProprietaryRules`] value is the compiled, immutable form of a list of
//! [`ProprietaryRule`]s. It is built once (either from
//! [`ProprietaryRules::default_catalog`] or through [`ProprietaryRulesBuilder`])
//! and then shared read-only by every sanitizer that needs it. Nothing in this
//! module performs I/O.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::ScrubError;
use crate::Result;

/// Lockfiles are regenerated by the target build and never published.
pub const LOCKFILES: &[&str] = &[
    "package-lock.json",
    "npm-shrinkwrap.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "bun.lockb",
    "bun.lock",
];

/// Env var names treated as secrets by the post-deploy sweep.
pub const DEFAULT_SENSITIVE_ENV_KEY: &str =
    r"(?i)(SERVICE_ROLE|SECRET|PRIVATE_KEY|PASSWORD|ACCESS_TOKEN|API_TOKEN|DB_URL)";

/// Returns true when the path's file name is a known package-manager lockfile.
pub fn is_lockfile(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    LOCKFILES.contains(&name)
}

/// A single proprietary marker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProprietaryRule {
    /// Module specifier whose import/require statements are stripped.
    /// A trailing `/` matches every module in that scope.
    ImportPattern { module: String },
    /// Regex over the `/`-separated file path. Matching files are dropped.
    FilenamePattern { pattern: String, reason: String },
    /// Regex stripped from the content of every file. `keyword` must appear
    /// (case-insensitively) in any text the pattern can match.
    ContentRegex {
        pattern: String,
        description: String,
        keyword: String,
    },
    /// Host name whose quoted string literals are replaced by empty literals.
    TelemetryDomain { domain: String },
    /// Package removed from manifests. A trailing `/*` matches the whole scope.
    SuspiciousDependency { name: String },
    /// Plugin-injection snippet stripped from build config files.
    HiddenPluginRegex {
        pattern: String,
        description: String,
        keyword: String,
    },
}

impl ProprietaryRule {
    /// Short kind label, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ProprietaryRule::ImportPattern { .. } => "import-pattern",
            ProprietaryRule::FilenamePattern { .. } => "filename-pattern",
            ProprietaryRule::ContentRegex { .. } => "content-regex",
            ProprietaryRule::TelemetryDomain { .. } => "telemetry-domain",
            ProprietaryRule::SuspiciousDependency { .. } => "suspicious-dependency",
            ProprietaryRule::HiddenPluginRegex { .. } => "hidden-plugin-regex",
        }
    }
}

/// A compiled regex together with the change description it produces.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub regex: Regex,
    pub description: String,
}

#[derive(Debug, Clone)]
struct DependencyMatcher {
    name: String,
    scope: bool,
}

impl DependencyMatcher {
    fn new(raw: &str) -> Self {
        match raw.strip_suffix("/*") {
            Some(scope) => Self {
                name: format!("{}/", scope),
                scope: true,
            },
            None => Self {
                name: raw.to_string(),
                scope: false,
            },
        }
    }

    fn matches(&self, candidate: &str) -> bool {
        if self.scope {
            candidate.starts_with(&self.name)
        } else {
            candidate == self.name
        }
    }
}

/// Compiled, immutable proprietary rule set.
#[derive(Debug, Clone)]
pub struct ProprietaryRules {
    rules: Vec<ProprietaryRule>,
    keywords: Vec<String>,
    imports: Vec<CompiledPattern>,
    filenames: Vec<(Regex, String)>,
    content: Vec<CompiledPattern>,
    telemetry: Option<Regex>,
    dependencies: Vec<DependencyMatcher>,
    hidden_plugins: Vec<CompiledPattern>,
    vendor_script: Option<Regex>,
    vendor_meta: Option<Regex>,
    vendor_attribute: Option<Regex>,
    sensitive_env_key: Regex,
}

impl ProprietaryRules {
    /// Start an empty builder.
    pub fn builder() -> ProprietaryRulesBuilder {
        ProprietaryRulesBuilder::default()
    }

    /// Rules targeting the Lovable / GPT-Engineer hosted platform.
    pub fn default_catalog() -> Result<Self> {
        let mut builder = Self::builder()
            .keyword("lovable")
            .keyword("gptengineer")
            .keyword("gpteng")
            .vendor_attribute_prefix("lov")
            .vendor_attribute_prefix("lovable")
            .vendor_attribute_prefix("gptengineer");

        for module in ["lovable-tagger", "@lovable/", "@gptengineer/", "gptengineer"] {
            builder = builder.rule(ProprietaryRule::ImportPattern {
                module: module.to_string(),
            });
        }

        for (pattern, reason) in [
            (r"(^|/)\.lovable(/|$)", "platform metadata directory"),
            (r"(^|/)\.gptengineer(/|$)", "platform metadata directory"),
            (
                r"(^|/)lovable\.config\.(js|cjs|mjs|ts|json)$",
                "platform config file",
            ),
            (r"(^|/)\.lovablerc(\.json)?$", "platform config file"),
            (r"(^|/)gptengineer\.json$", "platform config file"),
            (
                r"(^|/)(package-lock\.json|npm-shrinkwrap\.json|yarn\.lock|pnpm-lock\.yaml|bun\.lockb?)$",
                "lockfile pins proprietary packages",
            ),
        ] {
            builder = builder.rule(ProprietaryRule::FilenamePattern {
                pattern: pattern.to_string(),
                reason: reason.to_string(),
            });
        }

        builder = builder.rule(ProprietaryRule::ContentRegex {
            pattern: r#"[ \t]+data-(?:lov|lovable)-[\w-]+=(?:"[^"]*"|'[^']*'|\{[^}]*\})"#
                .to_string(),
            description: "Stripped component tagging attributes".to_string(),
            keyword: "data-lov".to_string(),
        });

        for domain in [
            "lovable.dev",
            "lovable.app",
            "lovableproject.com",
            "gpteng.co",
            "gptengineer.app",
        ] {
            builder = builder.rule(ProprietaryRule::TelemetryDomain {
                domain: domain.to_string(),
            });
        }

        for name in ["lovable-tagger", "@lovable/*", "@gptengineer/*", "gptengineer"] {
            builder = builder.rule(ProprietaryRule::SuspiciousDependency {
                name: name.to_string(),
            });
        }

        builder = builder
            .rule(ProprietaryRule::HiddenPluginRegex {
                pattern: r#"mode\s*===\s*['"]development['"]\s*&&\s*componentTagger\(\s*\)\s*,?"#
                    .to_string(),
                description: "Removed development-only componentTagger plugin".to_string(),
                keyword: "componentTagger".to_string(),
            })
            .rule(ProprietaryRule::HiddenPluginRegex {
                pattern: r"componentTagger\(\s*\)\s*,?".to_string(),
                description: "Removed componentTagger plugin".to_string(),
                keyword: "componentTagger".to_string(),
            });

        builder.build()
    }

    /// The source rules this catalog was compiled from.
    pub fn rules(&self) -> &[ProprietaryRule] {
        &self.rules
    }

    /// Lowercase trigger keywords. Every content rule is guaranteed to be
    /// covered by at least one of them.
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Reason for dropping the file entirely, if any filename rule matches.
    pub fn removal_reason(&self, path: &str) -> Option<&str> {
        let normalized = normalize_path(path);
        self.filenames
            .iter()
            .find(|(re, _)| re.is_match(&normalized))
            .map(|(_, reason)| reason.as_str())
    }

    /// Whether a package name is on the suspicious-dependency list.
    pub fn is_suspicious_dependency(&self, name: &str) -> bool {
        self.dependencies.iter().any(|d| d.matches(name))
    }

    /// Suspicious dependency names as written in the catalog (scope rules
    /// without their `/*` suffix).
    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.dependencies
            .iter()
            .map(|d| d.name.trim_end_matches('/'))
    }

    /// Whether an env var name looks like a secret.
    pub fn is_sensitive_env_key(&self, key: &str) -> bool {
        self.sensitive_env_key.is_match(key)
    }

    pub(crate) fn import_patterns(&self) -> &[CompiledPattern] {
        &self.imports
    }

    pub(crate) fn content_patterns(&self) -> &[CompiledPattern] {
        &self.content
    }

    /// Matches any telemetry domain; `None` when the catalog has none.
    pub(crate) fn telemetry_domains(&self) -> Option<&Regex> {
        self.telemetry.as_ref()
    }

    pub(crate) fn hidden_plugin_patterns(&self) -> &[CompiledPattern] {
        &self.hidden_plugins
    }

    pub(crate) fn vendor_script(&self) -> Option<&Regex> {
        self.vendor_script.as_ref()
    }

    pub(crate) fn vendor_meta(&self) -> Option<&Regex> {
        self.vendor_meta.as_ref()
    }

    pub(crate) fn vendor_attribute(&self) -> Option<&Regex> {
        self.vendor_attribute.as_ref()
    }
}

/// Builder for [`ProprietaryRules`].
#[derive(Debug, Clone, Default)]
pub struct ProprietaryRulesBuilder {
    rules: Vec<ProprietaryRule>,
    keywords: Vec<String>,
    vendor_attribute_prefixes: Vec<String>,
    sensitive_env_key: Option<String>,
}

impl ProprietaryRulesBuilder {
    /// Append a rule.
    pub fn rule(mut self, rule: ProprietaryRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Add an explicit pre-filter keyword.
    pub fn keyword(mut self, keyword: &str) -> Self {
        self.keywords.push(keyword.to_lowercase());
        self
    }

    /// Add a `data-<prefix>*` attribute family stripped from HTML entry files.
    pub fn vendor_attribute_prefix(mut self, prefix: &str) -> Self {
        self.vendor_attribute_prefixes.push(prefix.to_string());
        self
    }

    /// Override the secret env var name pattern.
    pub fn sensitive_env_key(mut self, pattern: &str) -> Self {
        self.sensitive_env_key = Some(pattern.to_string());
        self
    }

    /// Compile every rule.
    pub fn build(self) -> Result<ProprietaryRules> {
        let mut keywords = self.keywords;
        let mut imports = Vec::new();
        let mut filenames = Vec::new();
        let mut content = Vec::new();
        let mut domains = Vec::new();
        let mut dependencies = Vec::new();
        let mut hidden_plugins = Vec::new();

        for rule in &self.rules {
            match rule {
                ProprietaryRule::ImportPattern { module } => {
                    non_empty(rule, module)?;
                    keywords.push(module.trim_end_matches('/').to_lowercase());
                    imports.extend(compile_import(rule, module)?);
                }
                ProprietaryRule::FilenamePattern { pattern, reason } => {
                    non_empty(rule, pattern)?;
                    filenames.push((compile(rule, pattern, false)?, reason.clone()));
                }
                ProprietaryRule::ContentRegex {
                    pattern,
                    description,
                    keyword,
                } => {
                    non_empty(rule, keyword)?;
                    keywords.push(keyword.to_lowercase());
                    content.push(CompiledPattern {
                        regex: compile(rule, pattern, false)?,
                        description: description.clone(),
                    });
                }
                ProprietaryRule::TelemetryDomain { domain } => {
                    non_empty(rule, domain)?;
                    keywords.push(domain.to_lowercase());
                    domains.push(domain.clone());
                }
                ProprietaryRule::SuspiciousDependency { name } => {
                    non_empty(rule, name)?;
                    let matcher = DependencyMatcher::new(name);
                    keywords.push(matcher.name.trim_end_matches('/').to_lowercase());
                    dependencies.push(matcher);
                }
                ProprietaryRule::HiddenPluginRegex {
                    pattern,
                    description,
                    keyword,
                } => {
                    non_empty(rule, keyword)?;
                    keywords.push(keyword.to_lowercase());
                    hidden_plugins.push(CompiledPattern {
                        regex: compile(rule, pattern, false)?,
                        description: description.clone(),
                    });
                }
            }
        }

        for prefix in &self.vendor_attribute_prefixes {
            keywords.push(format!("data-{}", prefix.to_lowercase()));
        }

        keywords.retain(|k| !k.is_empty());
        keywords.sort();
        keywords.dedup();

        let telemetry = compile_telemetry(&domains)?;
        let vendor_script = compile_vendor_script(&domains)?;
        let vendor_meta = compile_vendor_meta(&keywords)?;
        let vendor_attribute = compile_vendor_attribute(&self.vendor_attribute_prefixes)?;

        let sensitive_source = self
            .sensitive_env_key
            .unwrap_or_else(|| DEFAULT_SENSITIVE_ENV_KEY.to_string());
        let sensitive_env_key =
            Regex::new(&sensitive_source).map_err(|source| ScrubError::InvalidPattern {
                rule: "sensitive-env-key".to_string(),
                source,
            })?;

        Ok(ProprietaryRules {
            rules: self.rules,
            keywords,
            imports,
            filenames,
            content,
            telemetry,
            dependencies,
            hidden_plugins,
            vendor_script,
            vendor_meta,
            vendor_attribute,
            sensitive_env_key,
        })
    }
}

fn normalize_path(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches("./").to_string()
}

fn non_empty(rule: &ProprietaryRule, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ScrubError::EmptyRule(rule.kind().to_string()));
    }
    Ok(())
}

fn compile(rule: &ProprietaryRule, pattern: &str, case_insensitive: bool) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|source| ScrubError::InvalidPattern {
            rule: rule.kind().to_string(),
            source,
        })
}

fn compile_import(rule: &ProprietaryRule, module: &str) -> Result<Vec<CompiledPattern>> {
    let module_re = match module.strip_suffix('/') {
        Some(scope) => format!(r#"{}/[^'"]*"#, regex::escape(scope)),
        None => regex::escape(module),
    };
    let es_import = format!(
        r#"(?m)^[ \t]*import\s+(?:[^;'"]*?\s+from\s+)?['"]{m}['"][ \t]*;?[ \t]*\r?\n?"#,
        m = module_re
    );
    let require = format!(
        r#"(?m)^[ \t]*(?:const|let|var)\s+[^=;\n]+=\s*require\(\s*['"]{m}['"]\s*\)[ \t]*;?[ \t]*\r?\n?"#,
        m = module_re
    );
    Ok(vec![
        CompiledPattern {
            regex: compile(rule, &es_import, false)?,
            description: format!("Removed import of '{}'", module),
        },
        CompiledPattern {
            regex: compile(rule, &require, false)?,
            description: format!("Removed require of '{}'", module),
        },
    ])
}

fn domain_alternation(domains: &[String]) -> String {
    domains
        .iter()
        .map(|d| regex::escape(d))
        .collect::<Vec<_>>()
        .join("|")
}

fn compile_telemetry(domains: &[String]) -> Result<Option<Regex>> {
    if domains.is_empty() {
        return Ok(None);
    }
    let pattern = format!("(?i)(?:{})", domain_alternation(domains));
    Regex::new(&pattern)
        .map(Some)
        .map_err(|source| ScrubError::InvalidPattern {
            rule: "telemetry-domain".to_string(),
            source,
        })
}

fn compile_vendor_script(domains: &[String]) -> Result<Option<Regex>> {
    if domains.is_empty() {
        return Ok(None);
    }
    let alt = domain_alternation(domains);
    // Also matches scripts whose src was already emptied by telemetry neutralization.
    let pattern = format!(
        r#"(?is)[ \t]*<script\b[^>]*\bsrc\s*=\s*(?:""|''|"[^"]*(?:{alt})[^"]*"|'[^']*(?:{alt})[^']*')[^>]*>.*?</script>[ \t]*\r?\n?"#,
        alt = alt
    );
    Regex::new(&pattern)
        .map(Some)
        .map_err(|source| ScrubError::InvalidPattern {
            rule: "vendor-script".to_string(),
            source,
        })
}

fn compile_vendor_meta(keywords: &[String]) -> Result<Option<Regex>> {
    let terms: Vec<String> = keywords
        .iter()
        .filter(|k| !k.starts_with("data-"))
        .map(|k| regex::escape(k))
        .collect();
    if terms.is_empty() {
        return Ok(None);
    }
    let pattern = format!(
        r"(?i)[ \t]*<meta\b[^>]*(?:{})[^>]*>[ \t]*\r?\n?",
        terms.join("|")
    );
    Regex::new(&pattern)
        .map(Some)
        .map_err(|source| ScrubError::InvalidPattern {
            rule: "vendor-meta".to_string(),
            source,
        })
}

fn compile_vendor_attribute(prefixes: &[String]) -> Result<Option<Regex>> {
    if prefixes.is_empty() {
        return Ok(None);
    }
    let alt = prefixes
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = format!(
        r#"(?i)\s+data-(?:{alt})\b(?:-[\w-]*)?(?:\s*=\s*(?:"[^"]*"|'[^']*'))?"#,
        alt = alt
    );
    Regex::new(&pattern)
        .map(Some)
        .map_err(|source| ScrubError::InvalidPattern {
            rule: "vendor-attribute".to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_compiles() {
        let rules = ProprietaryRules::default_catalog().unwrap();
        assert!(!rules.rules().is_empty());
        assert!(rules.keywords().contains(&"lovable".to_string()));
        assert!(rules.keywords().contains(&"componenttagger".to_string()));
    }

    #[test]
    fn test_removal_reason_matches_config_and_lockfiles() {
        let rules = ProprietaryRules::default_catalog().unwrap();
        assert!(rules.removal_reason(".lovable/settings.json").is_some());
        assert!(rules.removal_reason("lovable.config.ts").is_some());
        assert!(rules.removal_reason("./bun.lockb").is_some());
        assert!(rules.removal_reason("apps/web/package-lock.json").is_some());
        assert!(rules.removal_reason("src/lovable.ts").is_none());
        assert!(rules.removal_reason("src/App.tsx").is_none());
    }

    #[test]
    fn test_scoped_dependency_matching() {
        let rules = ProprietaryRules::default_catalog().unwrap();
        assert!(rules.is_suspicious_dependency("lovable-tagger"));
        assert!(rules.is_suspicious_dependency("@lovable/sdk"));
        assert!(!rules.is_suspicious_dependency("@lovable"));
        assert!(!rules.is_suspicious_dependency("react"));
    }

    #[test]
    fn test_sensitive_env_key() {
        let rules = ProprietaryRules::default_catalog().unwrap();
        assert!(rules.is_sensitive_env_key("SUPABASE_SERVICE_ROLE_KEY"));
        assert!(rules.is_sensitive_env_key("stripe_secret"));
        assert!(!rules.is_sensitive_env_key("VITE_SUPABASE_URL"));
    }

    #[test]
    fn test_builder_rejects_bad_regex() {
        let result = ProprietaryRules::builder()
            .rule(ProprietaryRule::ContentRegex {
                pattern: "(".to_string(),
                description: "broken".to_string(),
                keyword: "x".to_string(),
            })
            .build();
        assert!(matches!(result, Err(ScrubError::InvalidPattern { .. })));
    }

    #[test]
    fn test_builder_rejects_empty_keyword() {
        let result = ProprietaryRules::builder()
            .rule(ProprietaryRule::HiddenPluginRegex {
                pattern: "x".to_string(),
                description: "x".to_string(),
                keyword: " ".to_string(),
            })
            .build();
        assert!(matches!(result, Err(ScrubError::EmptyRule(_))));
    }

    #[test]
    fn test_is_lockfile() {
        assert!(is_lockfile("package-lock.json"));
        assert!(is_lockfile("web/yarn.lock"));
        assert!(!is_lockfile("package.json"));
    }
}
