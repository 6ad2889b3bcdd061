//! Deterministic prompt construction.
//!
//! Maps a [`ReviewRequest`] plus static lookup tables (per-language
//! idioms, personality traits, per-type rating criteria) to a
//! fully-specified [`Prompt`]. Pure string formatting, no I/O: the same
//! request and submission always yield a byte-identical prompt.
//!
//! Specialized review kinds (security, performance, architecture) use a
//! narrow single-focus template at low temperature; the remaining kinds
//! use the full structured template, sampled hotter for the roaster so
//! the humor actually lands.

use super::types::{Personality, Prompt, ReviewRequest, ReviewType, UserLevel};

/// Token budget for the full structured template.
const FULL_MAX_TOKENS: u32 = 2000;
/// Token budget for single-focus templates.
const FOCUSED_MAX_TOKENS: u32 = 1500;
/// Architecture reviews get extra room for refactoring sketches.
const ARCHITECTURE_MAX_TOKENS: u32 = 1800;

// ── Submission context ───────────────────────────────────────────

/// The code under review, as stored with the submission.
#[derive(Debug, Clone, Copy)]
pub struct SubmissionContext<'a> {
    pub code: &'a str,
    pub language: &'a str,
    pub description: &'a str,
}

// ── Language contexts ────────────────────────────────────────────

/// Per-language idiom table injected into the system prompt.
struct LanguageContext {
    patterns: &'static [&'static str],
    best_practices: &'static [&'static str],
    common_issues: &'static [&'static str],
    frameworks: &'static [&'static str],
}

const GENERIC_CONTEXT: LanguageContext = LanguageContext {
    patterns: &["clear control flow", "small functions", "explicit error paths"],
    best_practices: &["consistent naming", "single responsibility", "input validation"],
    common_issues: &["dead code", "deep nesting", "magic numbers", "missing error handling"],
    frameworks: &[],
};

fn language_context(language: &str) -> &'static LanguageContext {
    match language.to_ascii_lowercase().as_str() {
        "typescript" | "ts" => &LanguageContext {
            patterns: &["React components", "type safety", "async/await", "error handling"],
            best_practices: &["strict typing", "proper interfaces", "null checks", "immutability"],
            common_issues: &["any types", "missing error handling", "prop drilling", "memory leaks"],
            frameworks: &["React", "Next.js", "Express", "NestJS"],
        },
        "javascript" | "js" => &LanguageContext {
            patterns: &["ES6+ features", "promises", "closures", "prototypes"],
            best_practices: &["const/let usage", "arrow functions", "destructuring", "modules"],
            common_issues: &["var usage", "callback hell", "global variables", "loose equality"],
            frameworks: &["React", "Vue", "Angular", "Node.js"],
        },
        "python" | "py" => &LanguageContext {
            patterns: &["list comprehensions", "decorators", "context managers", "generators"],
            best_practices: &["PEP 8", "type hints", "docstrings", "virtual environments"],
            common_issues: &["mutable defaults", "global state", "bare except", "string concatenation"],
            frameworks: &["Django", "Flask", "FastAPI", "Pandas"],
        },
        "java" => &LanguageContext {
            patterns: &["OOP principles", "streams", "lambdas", "generics"],
            best_practices: &["SOLID principles", "proper exceptions", "resource management", "immutability"],
            common_issues: &["resource leaks", "null pointer exceptions", "raw types", "string concatenation"],
            frameworks: &["Spring", "Hibernate", "JUnit", "Maven"],
        },
        "go" | "golang" => &LanguageContext {
            patterns: &["goroutines", "channels", "interfaces", "error handling"],
            best_practices: &["error checking", "defer usage", "context usage", "package structure"],
            common_issues: &["ignored errors", "goroutine leaks", "race conditions", "improper context"],
            frameworks: &["Gin", "Echo", "Fiber", "GORM"],
        },
        "rust" | "rs" => &LanguageContext {
            patterns: &["ownership", "borrowing", "lifetimes", "pattern matching"],
            best_practices: &["error handling with Result", "iterator usage", "trait bounds", "cargo features"],
            common_issues: &["unnecessary clones", "unwrap usage", "lifetime issues", "unsafe blocks"],
            frameworks: &["Actix", "Axum", "Tokio", "Serde"],
        },
        _ => &GENERIC_CONTEXT,
    }
}

// ── Personality traits ───────────────────────────────────────────

/// Tone/approach profile for a reviewer persona.
struct PersonalityProfile {
    display_name: &'static str,
    tone: &'static str,
    approach: &'static str,
    register: &'static str,
}

fn personality_profile(personality: Personality) -> &'static PersonalityProfile {
    match personality {
        Personality::Mentor => &PersonalityProfile {
            display_name: "The Mentor",
            tone: "friendly and supportive",
            approach: "highlight strengths first, then gentle suggestions",
            register: "encouraging and motivational",
        },
        Personality::Roaster => &PersonalityProfile {
            display_name: "The Roaster",
            tone: "witty and sarcastic",
            approach: "use humor to make points memorable, stay constructive",
            register: "casual with sharp one-liners",
        },
        Personality::Guardian => &PersonalityProfile {
            display_name: "The Guardian",
            tone: "serious and vigilant",
            approach: "hunt vulnerabilities and threats before anything else",
            register: "precise and security-minded",
        },
        Personality::Optimizer => &PersonalityProfile {
            display_name: "The Optimizer",
            tone: "analytical and precise",
            approach: "find bottlenecks and quantify the win of each fix",
            register: "technical and measurement-driven",
        },
        Personality::Professor => &PersonalityProfile {
            display_name: "The Professor",
            tone: "educational and thorough",
            approach: "explain the principle behind every remark, cite best practices",
            register: "formal and pedagogical",
        },
    }
}

// ── Review-type profiles ─────────────────────────────────────────

/// Focus statement and rating criteria for each review kind.
struct ReviewTypeProfile {
    name: &'static str,
    focus: &'static str,
    criteria: &'static [&'static str],
}

fn review_type_profile(review_type: ReviewType) -> &'static ReviewTypeProfile {
    match review_type {
        ReviewType::Security => &ReviewTypeProfile {
            name: "Security Review",
            focus: "vulnerabilities, data protection, and security best practices",
            criteria: &[
                "Input validation",
                "Authentication/Authorization",
                "Data encryption",
                "Error handling",
                "Dependency security",
            ],
        },
        ReviewType::Performance => &ReviewTypeProfile {
            name: "Performance Review",
            focus: "optimization, resource usage, and efficiency",
            criteria: &[
                "Algorithm complexity",
                "Memory usage",
                "CPU utilization",
                "I/O operations",
                "Caching strategy",
            ],
        },
        ReviewType::BestPractices => &ReviewTypeProfile {
            name: "Best Practices Review",
            focus: "code quality, maintainability, and industry standards",
            criteria: &[
                "Code organization",
                "Documentation",
                "Error handling",
                "Testing coverage",
                "Maintainability",
            ],
        },
        ReviewType::Style => &ReviewTypeProfile {
            name: "Style Review",
            focus: "readability, consistency, and coding style",
            criteria: &[
                "Naming conventions",
                "Code formatting",
                "Comment quality",
                "Function length",
                "Variable usage",
            ],
        },
        ReviewType::Architecture => &ReviewTypeProfile {
            name: "Architecture Review",
            focus: "structure, design patterns, and long-term maintainability",
            criteria: &[
                "Separation of concerns",
                "Design patterns",
                "Dependency management",
                "Modularity",
                "Scalability",
            ],
        },
        ReviewType::General => &ReviewTypeProfile {
            name: "General Review",
            focus: "overall quality across correctness, clarity, and maintainability",
            criteria: &[
                "Correctness",
                "Readability",
                "Error handling",
                "Testing coverage",
                "Maintainability",
            ],
        },
    }
}

/// The fixed output shape every system prompt demands. The normalizer
/// parses this first; the heuristic fallbacks cover providers that ignore it.
const RESPONSE_SHAPE: &str = r#"Respond in EXACTLY this JSON format:
{
  "rating": 1-5,
  "key_points": ["headline observations"],
  "detailed_analysis": { "criterion name": 1-10 },
  "suggestions": [
    {
      "before_code": "original code",
      "after_code": "improved code",
      "explanation": "why this is better",
      "category": "performance|security|style|bug|optimization",
      "severity": "low|medium|high|critical"
    }
  ],
  "metrics": {
    "complexity": 0-100,
    "maintainability": 0-100,
    "performance": 0-100,
    "security": 0-100,
    "testability": 0-100,
    "documentation": 0-100
  },
  "tags": ["relevant", "tags"],
  "estimated_fix_minutes": minutes,
  "summary": "personality-voiced wrap-up",
  "code_smells": ["smells and anti-patterns found"]
}"#;

// ── Builder ──────────────────────────────────────────────────────

/// Build the provider prompt for a request. Deterministic; the only
/// inputs are the request, the submission, and the static tables above.
pub fn build_prompt(request: &ReviewRequest, ctx: &SubmissionContext<'_>) -> Prompt {
    match request.review_type {
        ReviewType::Security => focused_prompt(request, ctx, 0.1, FOCUSED_MAX_TOKENS),
        ReviewType::Performance => focused_prompt(request, ctx, 0.2, FOCUSED_MAX_TOKENS),
        ReviewType::Architecture => focused_prompt(request, ctx, 0.3, ARCHITECTURE_MAX_TOKENS),
        _ => structured_prompt(request, ctx),
    }
}

/// Full structured template for general/best-practices/style reviews.
fn structured_prompt(request: &ReviewRequest, ctx: &SubmissionContext<'_>) -> Prompt {
    let lang = language_context(ctx.language);
    let persona = personality_profile(request.personality);
    let profile = review_type_profile(request.review_type);

    let frameworks = if lang.frameworks.is_empty() {
        String::new()
    } else {
        format!("\n- Frameworks: {}", lang.frameworks.join(", "))
    };

    let system = format!(
        "You are {persona_name}, an expert {language} code reviewer with a {tone} tone.\n\
         Your approach: {approach}. Write in a {register} register.\n\n\
         LANGUAGE EXPERTISE:\n\
         - Patterns: {patterns}\n\
         - Best practices: {best}\n\
         - Common issues: {issues}{frameworks}\n\n\
         {level_guidance}\
         REVIEW TYPE: {type_name} — focus on {focus}.\n\
         Rate each of these criteria from 1-10: {criteria}.\n\n\
         {shape}",
        persona_name = persona.display_name,
        language = ctx.language,
        tone = persona.tone,
        approach = persona.approach,
        register = persona.register,
        patterns = lang.patterns.join(", "),
        best = lang.best_practices.join(", "),
        issues = lang.common_issues.join(", "),
        level_guidance = level_guidance(request.user_level),
        type_name = profile.name,
        focus = profile.focus,
        criteria = profile.criteria.join(", "),
        shape = RESPONSE_SHAPE,
    );

    let user = user_prompt(request, ctx);

    Prompt {
        system,
        user,
        temperature: if request.personality == Personality::Roaster { 0.8 } else { 0.3 },
        max_tokens: FULL_MAX_TOKENS,
    }
}

/// Narrow single-focus template for the specialized kinds.
fn focused_prompt(
    request: &ReviewRequest,
    ctx: &SubmissionContext<'_>,
    temperature: f32,
    max_tokens: u32,
) -> Prompt {
    let persona = personality_profile(request.personality);
    let profile = review_type_profile(request.review_type);

    let system = format!(
        "You are {persona_name}, a specialist performing a {type_name} of {language} code.\n\
         Focus exclusively on {focus}. Skip everything outside that focus.\n\
         Keep a {tone} tone.\n\n\
         Rate each of these criteria from 1-10: {criteria}.\n\n\
         {level_guidance}{shape}",
        persona_name = persona.display_name,
        type_name = profile.name,
        language = ctx.language,
        focus = profile.focus,
        tone = persona.tone,
        criteria = profile.criteria.join(", "),
        level_guidance = level_guidance(request.user_level),
        shape = RESPONSE_SHAPE,
    );

    Prompt {
        system,
        user: user_prompt(request, ctx),
        temperature,
        max_tokens,
    }
}

fn level_guidance(level: Option<UserLevel>) -> &'static str {
    match level {
        Some(UserLevel::Beginner) => {
            "USER LEVEL: beginner. Explain concepts plainly and avoid overwhelming jargon.\n\n"
        }
        Some(UserLevel::Advanced) => {
            "USER LEVEL: advanced. Focus on advanced patterns, optimizations, and architectural concerns.\n\n"
        }
        Some(UserLevel::Intermediate) => "USER LEVEL: intermediate.\n\n",
        None => "",
    }
}

fn user_prompt(request: &ReviewRequest, ctx: &SubmissionContext<'_>) -> String {
    let focus_line = if request.focus_areas.is_empty() {
        String::new()
    } else {
        format!("\nFocus particularly on: {}.\n", request.focus_areas.join(", "))
    };
    let description = if ctx.description.is_empty() {
        String::new()
    } else {
        format!("\nAuthor's description: {}\n", ctx.description)
    };

    format!(
        "Please review this {language} code:{description}\n\
         ```{language}\n{code}\n```\n{focus_line}",
        language = ctx.language,
        description = description,
        code = ctx.code,
        focus_line = focus_line,
    )
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn request(review_type: ReviewType, personality: Personality) -> ReviewRequest {
        ReviewRequest {
            submission_id: Uuid::nil(),
            review_type,
            personality,
            model: "gpt-4".into(),
            focus_areas: vec![],
            user_level: None,
        }
    }

    fn ctx() -> SubmissionContext<'static> {
        SubmissionContext {
            code: "fn main() { println!(\"hi\"); }",
            language: "rust",
            description: "Hello world",
        }
    }

    #[test]
    fn build_is_deterministic() {
        let req = request(ReviewType::General, Personality::Mentor);
        let a = build_prompt(&req, &ctx());
        let b = build_prompt(&req, &ctx());
        assert_eq!(a, b);
    }

    #[test]
    fn structured_prompt_embeds_tables() {
        let req = request(ReviewType::BestPractices, Personality::Professor);
        let prompt = build_prompt(&req, &ctx());
        assert!(prompt.system.contains("The Professor"));
        assert!(prompt.system.contains("ownership"));
        assert!(prompt.system.contains("Best Practices Review"));
        assert!(prompt.user.contains("```rust"));
        assert!(prompt.user.contains("println!"));
    }

    #[test]
    fn system_prompt_demands_fixed_shape() {
        for rt in ReviewType::ALL {
            let prompt = build_prompt(&request(rt, Personality::Mentor), &ctx());
            assert!(prompt.system.contains("\"rating\": 1-5"), "{rt} missing shape");
            assert!(prompt.system.contains("\"estimated_fix_minutes\""));
        }
    }

    #[test]
    fn specialized_kinds_sample_colder() {
        let security = build_prompt(&request(ReviewType::Security, Personality::Guardian), &ctx());
        let performance = build_prompt(&request(ReviewType::Performance, Personality::Optimizer), &ctx());
        let architecture = build_prompt(&request(ReviewType::Architecture, Personality::Professor), &ctx());
        assert_eq!(security.temperature, 0.1);
        assert_eq!(performance.temperature, 0.2);
        assert_eq!(architecture.temperature, 0.3);
        assert_eq!(architecture.max_tokens, ARCHITECTURE_MAX_TOKENS);
    }

    #[test]
    fn roaster_samples_hotter_on_structured_template() {
        let roast = build_prompt(&request(ReviewType::General, Personality::Roaster), &ctx());
        let mentor = build_prompt(&request(ReviewType::General, Personality::Mentor), &ctx());
        assert_eq!(roast.temperature, 0.8);
        assert_eq!(mentor.temperature, 0.3);
    }

    #[test]
    fn roaster_stays_cold_on_specialized_template() {
        let prompt = build_prompt(&request(ReviewType::Security, Personality::Roaster), &ctx());
        assert_eq!(prompt.temperature, 0.1);
    }

    #[test]
    fn unknown_language_falls_back_to_generic() {
        let req = request(ReviewType::General, Personality::Mentor);
        let context = SubmissionContext {
            code: "BEGIN END.",
            language: "cobol",
            description: "",
        };
        let prompt = build_prompt(&req, &context);
        assert!(prompt.system.contains("clear control flow"));
    }

    #[test]
    fn focus_areas_and_level_appear() {
        let mut req = request(ReviewType::General, Personality::Mentor);
        req.focus_areas = vec!["error handling".into(), "naming".into()];
        req.user_level = Some(UserLevel::Beginner);
        let prompt = build_prompt(&req, &ctx());
        assert!(prompt.user.contains("error handling, naming"));
        assert!(prompt.system.contains("beginner"));
    }
}
