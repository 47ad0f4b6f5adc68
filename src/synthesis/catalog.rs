//! Sample workspace content, keyed by role tag.
//!
//! Every role gets the shared rituals plus its own directories, templates,
//! topics and feed posts. Unknown or missing role tags get the general set.

/// A directory to create. `parent` names another directory in the same set.
#[derive(Debug, Clone, Copy)]
pub struct DirectorySpec {
    pub name: &'static str,
    pub parent: Option<&'static str>,
    pub description: &'static str,
    pub color: &'static str,
    pub icon: &'static str,
}

/// Steps as `(content, substeps)` pairs.
pub type StepSpec = (&'static str, &'static [&'static str]);

/// A process template to create.
#[derive(Debug, Clone, Copy)]
pub struct TemplateSpec {
    pub title: &'static str,
    pub category: &'static str,
    pub description: &'static str,
    /// Directory name the template lives in
    pub directory: &'static str,
    pub steps: &'static [StepSpec],
    pub favorite: bool,
    /// Fork an instance for the owner during the processes phase
    pub fork: bool,
    /// Number of leading instance steps to mark completed
    pub progress: usize,
}

/// A teammate who authors feed posts.
#[derive(Debug, Clone, Copy)]
pub struct Teammate {
    pub handle: &'static str,
    pub display_name: &'static str,
}

/// A feed post to create.
#[derive(Debug, Clone, Copy)]
pub struct PostSpec {
    pub topic: &'static str,
    pub title: &'static str,
    pub body: &'static str,
    /// Index into the teammate list
    pub author: usize,
    pub days_ago: i64,
    /// Template title the post refers to
    pub process: Option<&'static str>,
}

/// Everything synthesized for one role.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub directories: Vec<DirectorySpec>,
    pub templates: Vec<TemplateSpec>,
    pub topics: Vec<(&'static str, &'static str)>,
    pub posts: Vec<PostSpec>,
    pub teammates: Vec<Teammate>,
    pub preferences: Vec<(&'static str, &'static str)>,
}

const TEAMMATES: &[Teammate] = &[
    Teammate {
        handle: "ada",
        display_name: "Ada Park",
    },
    Teammate {
        handle: "sam",
        display_name: "Sam Okafor",
    },
    Teammate {
        handle: "lee",
        display_name: "Lee Moreno",
    },
];

const SHARED_DIRECTORIES: &[DirectorySpec] = &[
    DirectorySpec {
        name: "Team Rituals",
        parent: None,
        description: "Recurring meetings that keep the team in sync",
        color: "#4f46e5",
        icon: "repeat",
    },
    DirectorySpec {
        name: "Personal",
        parent: None,
        description: "Your own routines",
        color: "#059669",
        icon: "user",
    },
];

const SHARED_TEMPLATES: &[TemplateSpec] = &[
    TemplateSpec {
        title: "Team Standup",
        category: "ritual",
        description: "Fifteen minutes to surface progress and blockers",
        directory: "Team Rituals",
        steps: &[
            ("Share yesterday's progress", &[]),
            ("Share today's plan", &[]),
            ("Raise blockers", &["Assign an owner to each blocker"]),
        ],
        favorite: true,
        fork: true,
        progress: 0,
    },
    TemplateSpec {
        title: "Weekly 1:1",
        category: "ritual",
        description: "Check in with your manager",
        directory: "Team Rituals",
        steps: &[
            ("Add talking points", &[]),
            ("Review last week's actions", &[]),
            ("Agree on next actions", &[]),
        ],
        favorite: false,
        fork: true,
        progress: 1,
    },
    TemplateSpec {
        title: "Monthly Retrospective",
        category: "ritual",
        description: "Look back at what worked and what did not",
        directory: "Team Rituals",
        steps: &[
            ("Collect feedback", &["Send the survey", "Summarize answers"]),
            ("Discuss themes", &[]),
            ("Pick improvement actions", &["Assign owners"]),
        ],
        favorite: false,
        fork: false,
        progress: 0,
    },
    TemplateSpec {
        title: "Focus Block Planning",
        category: "personal",
        description: "Protect time for deep work",
        directory: "Personal",
        steps: &[
            ("List the week's priorities", &[]),
            ("Block calendar time", &["Decline conflicting invites"]),
        ],
        favorite: false,
        fork: false,
        progress: 0,
    },
];

const SHARED_TOPICS: &[(&str, &str)] = &[
    ("announcements", "Team-wide news"),
    ("kudos", "Shout-outs for teammates"),
];

const SHARED_POSTS: &[PostSpec] = &[
    PostSpec {
        topic: "announcements",
        title: "Welcome to the workspace",
        body: "Your rituals and checklists are set up. Fork a template to make it yours.",
        author: 0,
        days_ago: 7,
        process: Some("Team Standup"),
    },
    PostSpec {
        topic: "kudos",
        title: "Thanks for covering the retro",
        body: "Great facilitation last month, the action list was short and useful.",
        author: 1,
        days_ago: 3,
        process: Some("Monthly Retrospective"),
    },
];

const SHARED_PREFERENCES: &[(&str, &str)] = &[
    ("theme", "system"),
    ("week_start", "monday"),
    ("notifications", "enabled"),
];

const DEV_DIRECTORIES: &[DirectorySpec] = &[
    DirectorySpec {
        name: "Engineering",
        parent: None,
        description: "Engineering processes",
        color: "#2563eb",
        icon: "code",
    },
    DirectorySpec {
        name: "Releases",
        parent: Some("Engineering"),
        description: "Shipping checklists",
        color: "#0891b2",
        icon: "rocket",
    },
    DirectorySpec {
        name: "Incidents",
        parent: Some("Engineering"),
        description: "Response and follow-up",
        color: "#dc2626",
        icon: "alert",
    },
];

const DEV_TEMPLATES: &[TemplateSpec] = &[
    TemplateSpec {
        title: "Code Review",
        category: "engineering",
        description: "Review a change before merge",
        directory: "Engineering",
        steps: &[
            ("Read the description and linked issue", &[]),
            ("Check tests cover the change", &["Run the suite locally"]),
            ("Leave review comments", &[]),
        ],
        favorite: true,
        fork: true,
        progress: 2,
    },
    TemplateSpec {
        title: "Release Checklist",
        category: "engineering",
        description: "Steps to cut and deploy a release",
        directory: "Releases",
        steps: &[
            ("Freeze the release branch", &[]),
            ("Run the regression suite", &["Smoke tests", "Upgrade tests"]),
            ("Deploy to staging", &[]),
            ("Deploy to production", &["Watch error rates"]),
            ("Publish release notes", &[]),
        ],
        favorite: false,
        fork: true,
        progress: 2,
    },
    TemplateSpec {
        title: "Sprint Planning",
        category: "engineering",
        description: "Choose the next sprint's work",
        directory: "Engineering",
        steps: &[],
        favorite: false,
        fork: false,
        progress: 0,
    },
    TemplateSpec {
        title: "Incident Postmortem",
        category: "engineering",
        description: "Blameless review after an incident",
        directory: "Incidents",
        steps: &[
            ("Write the timeline", &[]),
            ("Identify contributing factors", &[]),
            ("File follow-up tickets", &["Link tickets to the report"]),
        ],
        favorite: false,
        fork: false,
        progress: 0,
    },
    TemplateSpec {
        title: "Architecture Workshop",
        category: "engineering",
        description: "Work through a design with the team",
        directory: "Engineering",
        steps: &[],
        favorite: false,
        fork: false,
        progress: 0,
    },
];

const DEV_TOPICS: &[(&str, &str)] = &[
    ("releases", "What shipped and when"),
    ("architecture", "Design discussions"),
];

const DEV_POSTS: &[PostSpec] = &[
    PostSpec {
        topic: "releases",
        title: "Release 2.4 is out",
        body: "Staging soaked for two days with no regressions. Notes are in the release checklist.",
        author: 2,
        days_ago: 2,
        process: Some("Release Checklist"),
    },
    PostSpec {
        topic: "architecture",
        title: "Proposal: split the sync worker",
        body: "The worker mixes scheduling and delivery. Bring questions to the workshop.",
        author: 0,
        days_ago: 5,
        process: Some("Architecture Workshop"),
    },
];

const DESIGN_DIRECTORIES: &[DirectorySpec] = &[
    DirectorySpec {
        name: "Design",
        parent: None,
        description: "Design practice",
        color: "#db2777",
        icon: "pen",
    },
    DirectorySpec {
        name: "Research",
        parent: Some("Design"),
        description: "User research",
        color: "#9333ea",
        icon: "search",
    },
];

const DESIGN_TEMPLATES: &[TemplateSpec] = &[
    TemplateSpec {
        title: "Design Critique",
        category: "design",
        description: "Structured feedback on work in progress",
        directory: "Design",
        steps: &[
            ("Share context and goals", &[]),
            ("Collect feedback", &["Capture notes in the file"]),
            ("Decide next iteration", &[]),
        ],
        favorite: true,
        fork: true,
        progress: 1,
    },
    TemplateSpec {
        title: "Usability Study",
        category: "research",
        description: "Run moderated sessions",
        directory: "Research",
        steps: &[
            ("Write the study plan", &[]),
            ("Recruit participants", &["Send screener", "Schedule sessions"]),
            ("Synthesize findings", &[]),
        ],
        favorite: false,
        fork: true,
        progress: 1,
    },
    TemplateSpec {
        title: "Prototype Workshop",
        category: "design",
        description: "Build a quick prototype together",
        directory: "Design",
        steps: &[],
        favorite: false,
        fork: false,
        progress: 0,
    },
];

const DESIGN_TOPICS: &[(&str, &str)] = &[("design-system", "Components and tokens")];

const DESIGN_POSTS: &[PostSpec] = &[PostSpec {
    topic: "design-system",
    title: "New spacing tokens",
    body: "We replaced pixel values with a 4-step scale. Critique sessions will use the new kit.",
    author: 1,
    days_ago: 4,
    process: Some("Design Critique"),
}];

const PM_DIRECTORIES: &[DirectorySpec] = &[
    DirectorySpec {
        name: "Product",
        parent: None,
        description: "Product management",
        color: "#ea580c",
        icon: "map",
    },
    DirectorySpec {
        name: "Launches",
        parent: Some("Product"),
        description: "Go-to-market",
        color: "#ca8a04",
        icon: "flag",
    },
];

const PM_TEMPLATES: &[TemplateSpec] = &[
    TemplateSpec {
        title: "Roadmap Planning",
        category: "product",
        description: "Quarterly roadmap refresh",
        directory: "Product",
        steps: &[
            ("Review goals and metrics", &[]),
            ("Rank candidate bets", &["Estimate impact", "Estimate effort"]),
            ("Publish the roadmap", &[]),
        ],
        favorite: true,
        fork: true,
        progress: 1,
    },
    TemplateSpec {
        title: "Launch Readiness Review",
        category: "product",
        description: "Confirm a launch can go ahead",
        directory: "Launches",
        steps: &[
            ("Confirm docs are live", &[]),
            ("Confirm support is briefed", &[]),
            ("Go or no-go decision", &[]),
        ],
        favorite: false,
        fork: true,
        progress: 0,
    },
    TemplateSpec {
        title: "Stakeholder Sync",
        category: "product",
        description: "Keep stakeholders informed",
        directory: "Product",
        steps: &[],
        favorite: false,
        fork: false,
        progress: 0,
    },
];

const PM_TOPICS: &[(&str, &str)] = &[("roadmap", "Plans and priorities")];

const PM_POSTS: &[PostSpec] = &[PostSpec {
    topic: "roadmap",
    title: "Q2 roadmap draft",
    body: "Three bets made the cut. Comments welcome before the planning session.",
    author: 2,
    days_ago: 6,
    process: Some("Roadmap Planning"),
}];

const GENERAL_TEMPLATES: &[TemplateSpec] = &[TemplateSpec {
    title: "Project Kickoff",
    category: "project",
    description: "Start a project with shared expectations",
    directory: "Team Rituals",
    steps: &[
        ("Agree on goals", &[]),
        ("Assign roles", &[]),
        ("Set the first milestone", &[]),
    ],
    favorite: false,
    fork: true,
    progress: 1,
}];

/// The catalog for a role tag.
pub fn for_role(role_tag: Option<&str>) -> Catalog {
    let role = role_tag.map(|r| r.trim().to_lowercase());
    let (directories, templates, topics, posts): (
        &[DirectorySpec],
        &[TemplateSpec],
        &[(&str, &str)],
        &[PostSpec],
    ) = match role.as_deref() {
        Some("dev") | Some("engineer") | Some("developer") => {
            (DEV_DIRECTORIES, DEV_TEMPLATES, DEV_TOPICS, DEV_POSTS)
        }
        Some("design") | Some("designer") => {
            (DESIGN_DIRECTORIES, DESIGN_TEMPLATES, DESIGN_TOPICS, DESIGN_POSTS)
        }
        Some("pm") | Some("product") => (PM_DIRECTORIES, PM_TEMPLATES, PM_TOPICS, PM_POSTS),
        _ => (&[], GENERAL_TEMPLATES, &[], &[]),
    };

    let mut preferences = SHARED_PREFERENCES.to_vec();
    preferences.push((
        "default_view",
        if role.is_some() { "calendar" } else { "list" },
    ));

    Catalog {
        directories: [SHARED_DIRECTORIES, directories].concat(),
        templates: [SHARED_TEMPLATES, templates].concat(),
        topics: [SHARED_TOPICS, topics].concat(),
        posts: [SHARED_POSTS, posts].concat(),
        teammates: TEAMMATES.to_vec(),
        preferences,
    }
}
