//! Renderers for every page. Upstream payloads arrive as untyped JSON whose
//! shape is not guaranteed, so every accessor falls back to a placeholder
//! instead of failing on a missing field.

use serde_json::Value;

use crate::store::{BookmarkEntry, HistoryEntry};

pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// First present string field among `keys`, or empty.
fn text<'a>(value: &'a Value, keys: &[&str]) -> &'a str {
    keys.iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .unwrap_or("")
}

fn item_slug(item: &Value) -> &str {
    text(item, &["animeId", "slug", "id"])
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{} - nonton</title>
<style>
body {{ font-family: sans-serif; margin: 0; background: #111; color: #eee; }}
nav {{ display: flex; gap: 1rem; align-items: center; padding: .75rem 1rem; background: #1b1b1b; }}
nav a {{ color: #8ab4f8; text-decoration: none; }}
main {{ padding: 1rem; }}
.grid {{ display: grid; grid-template-columns: repeat(auto-fill, minmax(160px, 1fr)); gap: 1rem; }}
.card {{ background: #1b1b1b; border-radius: 6px; overflow: hidden; }}
.card img {{ width: 100%; aspect-ratio: 3/4; object-fit: cover; display: block; }}
.card p {{ margin: .5rem; font-size: .9rem; }}
.error {{ background: #5c1a1a; padding: .75rem 1rem; border-radius: 6px; }}
.pager a, button {{ color: #8ab4f8; background: #1b1b1b; border: 1px solid #333; padding: .4rem .8rem; border-radius: 4px; cursor: pointer; }}
a {{ color: #8ab4f8; }}
iframe {{ width: 100%; aspect-ratio: 16/9; border: 0; }}
</style>
</head>
<body>
<nav>
<a href="/"><strong>nonton</strong></a>
<a href="/schedule">Schedule</a>
<a href="/library">Library</a>
<a href="/history">History</a>
<a href="/bookmark">Bookmark</a>
<form action="/search" method="get"><input type="search" name="q" placeholder="Search anime..."></form>
</nav>
<main>
{}
</main>
</body>
</html>"#,
        escape(title),
        body
    )
}

fn anime_card(item: &Value) -> String {
    let slug = item_slug(item);
    let title = text(item, &["title", "name"]);
    let poster = text(item, &["poster", "image"]);
    let episodes = text(item, &["episodes", "episode", "currentEpisode"]);
    let extra = if episodes.is_empty() {
        String::new()
    } else {
        format!("<p>{}</p>", escape(episodes))
    };
    format!(
        r#"<div class="card"><a href="/detail/{}"><img src="{}" alt="{}" loading="lazy"><p>{}</p></a>{}</div>"#,
        escape(slug),
        escape(poster),
        escape(title),
        escape(title),
        extra
    )
}

fn anime_grid(list: &Value, empty_message: &str) -> String {
    match list.as_array() {
        Some(items) if !items.is_empty() => {
            let cards: String = items.iter().map(anime_card).collect();
            format!(r#"<div class="grid">{cards}</div>"#)
        }
        _ => format!("<p>{}</p>", escape(empty_message)),
    }
}

fn pager(base: &str, page: u32) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    let prev = if page > 1 {
        format!(r#"<a href="{base}{sep}page={}">&laquo; Prev</a> "#, page - 1)
    } else {
        String::new()
    };
    format!(
        r#"<p class="pager">{prev}<a href="{base}{sep}page={}">Next &raquo;</a></p>"#,
        page + 1
    )
}

pub fn index(ongoing: &Value, completed: &Value, page: u32, error: Option<&str>) -> String {
    let banner = match error {
        Some(message) => format!(r#"<p class="error">{}</p>"#, escape(message)),
        None => String::new(),
    };
    let body = format!(
        "{banner}<h2>Ongoing</h2>{}<h2>Completed</h2>{}{}",
        anime_grid(ongoing, "No ongoing anime."),
        anime_grid(completed, "No completed anime."),
        pager("/", page)
    );
    layout("Home", &body)
}

pub fn schedule(schedule: Option<&Value>) -> String {
    let body = match schedule.and_then(Value::as_array) {
        Some(days) if !days.is_empty() => days
            .iter()
            .map(|entry| {
                format!(
                    "<h2>{}</h2>{}",
                    escape(text(entry, &["day"])),
                    anime_grid(
                        entry.get("animeList").unwrap_or(&Value::Null),
                        "Nothing scheduled."
                    )
                )
            })
            .collect(),
        _ => String::from("<p>No schedule available.</p>"),
    };
    layout("Schedule", &body)
}

pub fn search(results: Option<&Value>, query: &str) -> String {
    let body = format!(
        "<h2>Results for \"{}\"</h2>{}",
        escape(query),
        anime_grid(results.unwrap_or(&Value::Null), "No results found.")
    );
    layout("Search", &body)
}

pub fn genre(results: Option<&Value>, slug: &str, page: u32) -> String {
    let body = format!(
        "<h2>Genre: {}</h2>{}{}",
        escape(slug),
        anime_grid(results.unwrap_or(&Value::Null), "No anime in this genre."),
        pager(&format!("/genre/{}", escape(slug)), page)
    );
    layout(&format!("Genre: {slug}"), &body)
}

pub fn library(list: Option<&Value>) -> String {
    let body = match list.and_then(Value::as_array) {
        Some(groups) if !groups.is_empty() => {
            // The catalog may arrive grouped by starting letter or flat.
            if groups.iter().any(|g| g.get("animeList").is_some()) {
                groups
                    .iter()
                    .map(|group| {
                        format!(
                            "<h2>{}</h2>{}",
                            escape(text(group, &["startWith", "startsWith", "letter"])),
                            anime_grid(
                                group.get("animeList").unwrap_or(&Value::Null),
                                "Nothing here."
                            )
                        )
                    })
                    .collect()
            } else {
                anime_grid(list.unwrap_or(&Value::Null), "The catalog is empty.")
            }
        }
        _ => String::from("<p>The catalog is empty.</p>"),
    };
    layout("Library", &body)
}

pub fn detail(anime: Option<&Value>, slug: &str, bookmarked: bool) -> String {
    let Some(anime) = anime else {
        let body = "<p class=\"error\">Couldn't load this anime. Try again later.</p>";
        return layout("Detail", body);
    };
    let title = text(anime, &["title", "name"]);
    let poster = text(anime, &["poster", "image"]);
    let synopsis = anime
        .get("synopsis")
        .map(|s| match s {
            Value::String(text) => text.clone(),
            other => text(other, &["paragraphs", "text"]).to_string(),
        })
        .unwrap_or_default();

    let genres = anime
        .get("genreList")
        .and_then(Value::as_array)
        .map(|genres| {
            genres
                .iter()
                .map(|genre| {
                    format!(
                        r#"<a href="/genre/{}">{}</a>"#,
                        escape(text(genre, &["genreId", "slug"])),
                        escape(text(genre, &["title", "name"]))
                    )
                })
                .collect::<Vec<_>>()
                .join(" &middot; ")
        })
        .unwrap_or_default();

    let episodes = anime
        .get("episodeList")
        .and_then(Value::as_array)
        .map(|episodes| {
            let items: String = episodes
                .iter()
                .map(|episode| {
                    format!(
                        r#"<li><a href="/watch/{}?poster={}">{}</a></li>"#,
                        escape(text(episode, &["episodeId", "slug"])),
                        escape(poster),
                        escape(text(episode, &["title", "name"]))
                    )
                })
                .collect();
            format!("<h3>Episodes</h3><ul>{items}</ul>")
        })
        .unwrap_or_default();

    let toggle_label = if bookmarked {
        "Remove bookmark"
    } else {
        "Add bookmark"
    };
    let body = format!(
        r#"<h2>{}</h2>
<img src="{}" alt="{}" width="200">
<p>{}</p>
<p>{}</p>
<form action="/bookmark/toggle" method="post">
<input type="hidden" name="id" value="{}">
<input type="hidden" name="title" value="{}">
<input type="hidden" name="poster" value="{}">
<input type="hidden" name="link" value="/detail/{}">
<input type="hidden" name="back" value="/detail/{}">
<button type="submit">{}</button>
</form>
{}
<p><a href="/batch/{}">Batch download</a></p>"#,
        escape(title),
        escape(poster),
        escape(title),
        genres,
        escape(&synopsis),
        escape(slug),
        escape(title),
        escape(poster),
        escape(slug),
        escape(slug),
        toggle_label,
        episodes,
        escape(slug)
    );
    layout(title, &body)
}

pub fn watch(video: Option<&Value>, slug: &str) -> String {
    let Some(video) = video else {
        let body = "<p class=\"error\">Couldn't load this episode. Try again later.</p>";
        return layout("Watch", body);
    };
    let title = text(video, &["title", "name"]);
    let stream_url = text(video, &["defaultStreamingUrl", "streamingUrl", "url"]);
    let player = if stream_url.is_empty() {
        String::from("<p>No stream available for this episode.</p>")
    } else {
        format!(
            r#"<iframe src="{}" allowfullscreen></iframe>"#,
            escape(stream_url)
        )
    };

    // Alternate quality servers; each link returns the raw upstream JSON.
    let servers = video
        .get("server")
        .and_then(|server| server.get("qualities"))
        .and_then(Value::as_array)
        .map(|qualities| {
            let items: String = qualities
                .iter()
                .map(|quality| {
                    let servers: String = quality
                        .get("serverList")
                        .and_then(Value::as_array)
                        .map(|list| {
                            list.iter()
                                .map(|server| {
                                    format!(
                                        r#"<a href="/get-stream/{}">{}</a> "#,
                                        escape(text(server, &["serverId", "id"])),
                                        escape(text(server, &["title", "name"]))
                                    )
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    format!(
                        "<li>{} {}</li>",
                        escape(text(quality, &["title", "name"])),
                        servers
                    )
                })
                .collect();
            format!("<h3>Servers</h3><ul>{items}</ul>")
        })
        .unwrap_or_default();

    let body = format!(
        "<h2>{}</h2>{}{}<p><a href=\"/history\">Watch history</a></p>",
        escape(if title.is_empty() { slug } else { title }),
        player,
        servers
    );
    layout(if title.is_empty() { slug } else { title }, &body)
}

pub fn history(entries: &[HistoryEntry]) -> String {
    let body = if entries.is_empty() {
        String::from("<p>No watch history yet.</p>")
    } else {
        let cards: String = entries
            .iter()
            .map(|entry| {
                format!(
                    r#"<div class="card"><a href="{}"><img src="{}" alt="{}" loading="lazy"><p>{}</p></a><p>watched {}</p></div>"#,
                    escape(&entry.link),
                    escape(&entry.poster),
                    escape(&entry.title),
                    escape(&entry.title),
                    entry.watched_at.format("%Y-%m-%d %H:%M")
                )
            })
            .collect();
        format!(
            r#"<div class="grid">{cards}</div>
<form action="/history/clear" method="post" onsubmit="return confirm('Clear all watch history?')">
<button type="submit">Clear history</button>
</form>"#
        )
    };
    layout("History", &format!("<h2>Watch history</h2>{body}"))
}

pub fn bookmark(entries: &[BookmarkEntry]) -> String {
    let body = if entries.is_empty() {
        String::from("<p>No bookmarks yet.</p>")
    } else {
        let cards: String = entries
            .iter()
            .map(|entry| {
                format!(
                    r#"<div class="card"><a href="{}"><img src="{}" alt="{}" loading="lazy"><p>{}</p></a><p>saved {}</p></div>"#,
                    escape(&entry.link),
                    escape(&entry.poster),
                    escape(&entry.title),
                    escape(&entry.title),
                    entry.bookmarked_at.format("%Y-%m-%d %H:%M")
                )
            })
            .collect();
        format!(
            r#"<div class="grid">{cards}</div>
<form action="/bookmark/clear" method="post" onsubmit="return confirm('Clear all bookmarks?')">
<button type="submit">Clear bookmarks</button>
</form>"#
        )
    };
    layout("Bookmark", &format!("<h2>Bookmarks</h2>{body}"))
}

pub fn batch(batch: Option<&Value>, slug: &str) -> String {
    let Some(batch) = batch else {
        let body = format!(
            "<p class=\"error\">No batch download found for {}.</p>",
            escape(slug)
        );
        return layout("Batch", &body);
    };
    let title = text(batch, &["title", "name"]);
    let mut links = Vec::new();
    collect_download_links(batch, &mut links);
    let list = if links.is_empty() {
        String::from("<p>No download links listed.</p>")
    } else {
        let items: String = links
            .iter()
            .map(|(label, url)| {
                format!(
                    r#"<li><a href="{}">{}</a></li>"#,
                    escape(url),
                    escape(if label.is_empty() { url } else { label })
                )
            })
            .collect();
        format!("<ul>{items}</ul>")
    };
    let body = format!(
        "<h2>{}</h2><h3>Downloads</h3>{}",
        escape(if title.is_empty() { slug } else { title }),
        list
    );
    layout("Batch", &body)
}

/// Walks the batch payload for anything that looks like a download link. The
/// nesting of the downloadUrl block varies between shows, so this matches on
/// structure (an object carrying a `url` string) rather than fixed paths.
fn collect_download_links(value: &Value, links: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            if let Some(url) = map.get("url").and_then(Value::as_str) {
                let label = map
                    .get("title")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                links.push((label, url.to_string()));
            }
            for nested in map.values() {
                collect_download_links(nested, links);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_download_links(item, links);
            }
        }
        _ => {}
    }
}

pub fn not_found() -> String {
    layout(
        "Not found",
        r#"<h2>404</h2><p>This page doesn't exist. <a href="/">Back to home</a></p>"#,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn escape_neutralizes_markup() {
        assert_eq!(
            escape(r#"<b a="1">&'"#),
            "&lt;b a=&quot;1&quot;&gt;&amp;&#39;"
        );
    }

    #[test]
    fn index_tolerates_null_lists_and_shows_the_error_banner() {
        let page = index(&Value::Null, &Value::Null, 1, Some("Couldn't connect."));
        assert!(page.contains("Couldn&#39;t connect."));
        assert!(page.contains("No ongoing anime."));
        assert!(page.contains("No completed anime."));
    }

    #[test]
    fn cards_escape_upstream_strings() {
        let list = json!([{"title": "<script>alert(1)</script>", "animeId": "x"}]);
        let page = search(Some(&list), "q");
        assert!(!page.contains("<script>alert(1)</script>"));
        assert!(page.contains("&lt;script&gt;"));
    }

    #[test]
    fn detail_survives_missing_fields() {
        let page = detail(Some(&json!({})), "some-show", false);
        assert!(page.contains("Add bookmark"));
        let page = detail(None, "some-show", true);
        assert!(page.contains("Couldn't load"));
    }

    #[test]
    fn batch_collects_nested_download_links() {
        let payload = json!({
            "title": "Show Batch",
            "downloadUrl": {
                "formats": [
                    {"title": "MKV", "qualities": [
                        {"title": "720p", "urls": [{"title": "Mirror A", "url": "https://dl.example/a"}]}
                    ]}
                ]
            }
        });
        let page = batch(Some(&payload), "show-batch");
        assert!(page.contains("https://dl.example/a"));
        assert!(page.contains("Mirror A"));
    }

    #[test]
    fn history_page_includes_clear_confirmation() {
        let entries = vec![crate::store::HistoryEntry {
            id: "ep1".into(),
            title: "Episode 1".into(),
            poster: String::new(),
            link: "/watch/ep1".into(),
            watched_at: Utc::now(),
        }];
        let page = history(&entries);
        assert!(page.contains("confirm('Clear all watch history?')"));
        assert!(history(&[]).contains("No watch history yet."));
    }
}
