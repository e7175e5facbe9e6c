//! Keyword categorizer for discovered channels
//!
//! Scores the collection-point message text plus the resolved title against
//! a bilingual keyword table. The category with the most distinct keyword
//! hits wins; ties go to the earlier entry in the table.

use std::fmt;

/// Topic category assigned at verification time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    News,
    Tech,
    Video,
    Software,
    Books,
    Education,
    Resources,
    Entertainment,
    Lifestyle,
    Finance,
    Other,
}

const KEYWORDS: &[(Category, &[&str])] = &[
    (Category::News, &["新闻", "资讯", "news", "日报", "快讯", "时事"]),
    (
        Category::Tech,
        &["科技", "数码", "tech", "技术", "程序", "编程", "coding", "人工智能"],
    ),
    (
        Category::Video,
        &["电影", "影视", "视频", "movie", "剧集", "动漫", "番剧", "美剧", "韩剧"],
    ),
    (
        Category::Software,
        &["软件", "工具", "app", "software", "破解", "crack", "premium"],
    ),
    (
        Category::Books,
        &["电子书", "书籍", "book", "ebook", "小说", "阅读", "pdf", "epub"],
    ),
    (
        Category::Education,
        &["教程", "学习", "tutorial", "课程", "course", "教育", "考试"],
    ),
    (
        Category::Resources,
        &["资源", "分享", "share", "网盘", "download", "下载"],
    ),
    (
        Category::Entertainment,
        &["娱乐", "音乐", "music", "游戏", "game", "搞笑", "段子"],
    ),
    (
        Category::Lifestyle,
        &["生活", "服务", "购物", "shopping", "美食", "旅游"],
    ),
    (
        Category::Finance,
        &["金融", "投资", "股票", "crypto", "加密货币", "bitcoin", "交易"],
    ),
];

/// Short uppercase keywords, matched case-sensitively as whole words so
/// `AI 资讯` counts but `said` does not
const ACRONYMS: &[(Category, &[&str])] = &[(Category::Tech, &["IT", "AI"])];

fn contains_word(text: &str, word: &str) -> bool {
    text.match_indices(word).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + word.len()..].chars().next();
        !before.is_some_and(|c| c.is_ascii_alphanumeric())
            && !after.is_some_and(|c| c.is_ascii_alphanumeric())
    })
}

impl Category {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Tech => "tech",
            Self::Video => "video",
            Self::Software => "software",
            Self::Books => "books",
            Self::Education => "education",
            Self::Resources => "resources",
            Self::Entertainment => "entertainment",
            Self::Lifestyle => "lifestyle",
            Self::Finance => "finance",
            Self::Other => "other",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        let category = match s {
            "news" => Self::News,
            "tech" => Self::Tech,
            "video" => Self::Video,
            "software" => Self::Software,
            "books" => Self::Books,
            "education" => Self::Education,
            "resources" => Self::Resources,
            "entertainment" => Self::Entertainment,
            "lifestyle" => Self::Lifestyle,
            "finance" => Self::Finance,
            "other" => Self::Other,
            _ => return None,
        };
        Some(category)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Picks the best-scoring category for a message and an optional title
pub fn categorize(text: &str, title: Option<&str>) -> Category {
    let original = format!("{} {}", text, title.unwrap_or_default());
    let haystack = original.to_lowercase();

    let mut best = Category::Other;
    let mut best_score = 0;
    for (category, keywords) in KEYWORDS {
        let acronyms = ACRONYMS
            .iter()
            .filter(|(owner, _)| owner == category)
            .flat_map(|(_, words)| words.iter())
            .filter(|word| contains_word(&original, word))
            .count();
        let score = keywords
            .iter()
            .filter(|keyword| haystack.contains(**keyword))
            .count()
            + acronyms;
        if score > best_score {
            best = *category;
            best_score = score;
        }
    }
    best
}
