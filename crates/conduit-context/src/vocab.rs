/// Fixed vocabularies for the deterministic lexical entity pass (§4.B).
/// Matching is case-insensitive substring; callers lowercase the input
/// once and test each token against it.
pub const TECHNOLOGIES: &[&str] = &[
    "react", "vue", "angular", "svelte", "node", "nodejs", "python", "django", "flask",
    "fastapi", "postgres", "postgresql", "mysql", "mongodb", "redis", "docker", "kubernetes",
    "aws", "azure", "gcp", "graphql", "rest", "grpc", "typescript", "javascript", "java",
    "golang", "rust", "php", "ruby", "rails", "kafka", "websocket", "nextjs", "express",
];

pub const FEATURES: &[&str] = &[
    "authentication", "login", "signup", "payment", "payments", "search", "notifications",
    "chat", "upload", "dashboard", "analytics", "caching", "logging", "testing", "admin",
    "api", "realtime", "real-time", "messaging", "export", "import", "reporting",
];

pub const PROJECT_TYPES: &[&str] = &[
    "web app", "web application", "mobile app", "mobile application", "api", "microservice",
    "website", "service", "cli", "desktop app", "saas", "backend", "frontend",
];
