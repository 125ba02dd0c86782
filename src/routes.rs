use serde::Serialize;

/// Declarative route table for the UI. Breadcrumbs are derived from it by a
/// pure function instead of being assembled ad hoc per view; `:name`
/// segments mark parameters whose display label the caller resolves (course
/// titles, post titles, product names).
pub struct Route {
    pub pattern: &'static str,
}

pub const ROUTES: &[Route] = &[
    Route { pattern: "/" },
    Route { pattern: "/courses" },
    Route {
        pattern: "/courses/:courseId",
    },
    Route {
        pattern: "/courses/:courseId/lessons/:lessonId",
    },
    Route {
        pattern: "/courses/:courseId/quizzes/:quizId",
    },
    Route { pattern: "/blog" },
    Route {
        pattern: "/blog/:postId",
    },
    Route { pattern: "/shop" },
    Route {
        pattern: "/shop/:productId",
    },
    Route { pattern: "/cart" },
    Route { pattern: "/checkout" },
    Route {
        pattern: "/dashboard/teacher",
    },
    Route {
        pattern: "/dashboard/student",
    },
    Route {
        pattern: "/grade-tool",
    },
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Crumb {
    /// Display label. For a parameter segment this starts out as the raw
    /// segment value and is replaced by the resolver when a lookup succeeds.
    pub label: String,
    pub href: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<&'static str>,
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn pattern_segments(route: &Route) -> Vec<&'static str> {
    route
        .pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .collect()
}

/// Best-matching route for a path: same segment count, every static segment
/// equal, and among candidates the one with the most static segments wins.
pub fn match_route(path: &str) -> Option<&'static Route> {
    let segs = segments(path);
    let mut best: Option<(usize, &'static Route)> = None;
    for route in ROUTES {
        let pat = pattern_segments(route);
        if pat.len() != segs.len() {
            continue;
        }
        let mut static_hits = 0_usize;
        let mut ok = true;
        for (p, s) in pat.iter().zip(segs.iter()) {
            if let Some(_name) = p.strip_prefix(':') {
                continue;
            }
            if p != s {
                ok = false;
                break;
            }
            static_hits += 1;
        }
        if !ok {
            continue;
        }
        if best.map(|(hits, _)| static_hits > hits).unwrap_or(true) {
            best = Some((static_hits, route));
        }
    }
    best.map(|(_, r)| r)
}

/// Pure path-to-crumbs mapping. Every trail starts at Home; parameter
/// segments (per the matched route) carry their param name so the caller can
/// substitute a display name. Paths that match no route still get a trail,
/// with every segment treated as static.
pub fn breadcrumb_trail(path: &str) -> Vec<Crumb> {
    let segs = segments(path);
    let mut crumbs = vec![Crumb {
        label: "Home".to_string(),
        href: "/".to_string(),
        param: None,
    }];
    if segs.is_empty() {
        return crumbs;
    }

    let pattern: Vec<&'static str> = match match_route(path) {
        Some(route) => pattern_segments(route),
        None => Vec::new(),
    };

    let mut href = String::new();
    for (i, seg) in segs.iter().enumerate() {
        href.push('/');
        href.push_str(seg);
        let param = pattern.get(i).and_then(|p| p.strip_prefix(':'));
        let label = match param {
            Some(_) => (*seg).to_string(),
            None => segment_label(seg),
        };
        crumbs.push(Crumb {
            label,
            href: href.clone(),
            param,
        });
    }
    crumbs
}

/// Static segment labels: dash-separated words, each capitalized.
fn segment_label(segment: &str) -> String {
    segment
        .split('-')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_just_home() {
        let trail = breadcrumb_trail("/");
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].label, "Home");
        assert_eq!(trail[0].href, "/");
    }

    #[test]
    fn lesson_trail_marks_params() {
        let trail = breadcrumb_trail("/courses/c-42/lessons/l-7");
        let labels: Vec<&str> = trail.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["Home", "Courses", "c-42", "Lessons", "l-7"]);
        assert_eq!(trail[2].param, Some("courseId"));
        assert_eq!(trail[4].param, Some("lessonId"));
        assert_eq!(trail[4].href, "/courses/c-42/lessons/l-7");
        assert_eq!(trail[3].param, None);
    }

    #[test]
    fn static_route_beats_param_route() {
        // "/dashboard/teacher" could also read as "/blog/:postId"-style
        // param matches if scoring were naive; the static route must win.
        let trail = breadcrumb_trail("/dashboard/teacher");
        assert_eq!(trail[2].label, "Teacher");
        assert_eq!(trail[2].param, None);
    }

    #[test]
    fn unknown_paths_fall_back_to_static_labels() {
        let trail = breadcrumb_trail("/help/faq");
        let labels: Vec<&str> = trail.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["Home", "Help", "Faq"]);
        assert!(trail.iter().all(|c| c.param.is_none()));
    }

    #[test]
    fn dashed_segments_become_spaced_titles() {
        assert_eq!(segment_label("grade-tool"), "Grade Tool");
        let trail = breadcrumb_trail("/grade-tool");
        assert_eq!(trail[1].label, "Grade Tool");
    }

    #[test]
    fn trail_is_pure_and_repeatable() {
        let a = breadcrumb_trail("/shop/p-1");
        let b = breadcrumb_trail("/shop/p-1");
        assert_eq!(a, b);
    }
}
