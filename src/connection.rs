//! Cursor-based pagination over an already-materialized node list.
//!
//! Used by the admin key listing; generic enough that callers can paginate
//! any sorted `Vec` with caller-chosen cursors.

use crate::error::CacheError;

/// Pagination arguments: a forward window (`first`/`after`) optionally
/// narrowed from the back (`last`/`before`).
#[derive(Debug, Clone, Default)]
pub struct ConnectionArgs {
    pub first: Option<usize>,
    pub after: Option<String>,
    pub last: Option<usize>,
    pub before: Option<String>,
}

impl ConnectionArgs {
    pub fn first(n: usize) -> Self {
        ConnectionArgs {
            first: Some(n),
            ..ConnectionArgs::default()
        }
    }
}

/// One page of results plus the navigation facts a client needs to fetch
/// the next one.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection<N> {
    pub nodes: Vec<N>,
    /// Size of the full result set, not just this page.
    pub total_count: usize,
    /// Whether nodes exist past the end of this page.
    pub has_next_page: bool,
    /// Cursor of the last node on this page; feed it back as `after`.
    pub end_cursor: Option<String>,
}

/// Slice a page out of `nodes` according to `args`.
///
/// `limit` caps `first` and `last`; asking for more is a [`CacheError::UserInput`]
/// rather than a silent clamp. When neither is given and the window is larger
/// than `limit`, `first = limit` is assumed. A cursor that matches no node is
/// also a `UserInput` error, since it usually means the caller is paginating
/// a set that changed underneath them.
pub fn resolve_connection<N, F>(
    nodes: Vec<N>,
    args: &ConnectionArgs,
    limit: usize,
    create_cursor: F,
) -> Result<Connection<N>, CacheError>
where
    F: Fn(&N) -> String,
{
    if let Some(first) = args.first
        && first > limit
    {
        return Err(CacheError::UserInput(format!(
            "'first' must not exceed {}, got {}",
            limit, first
        )));
    }
    if let Some(last) = args.last
        && last > limit
    {
        return Err(CacheError::UserInput(format!(
            "'last' must not exceed {}, got {}",
            limit, last
        )));
    }

    let total_count = nodes.len();
    let cursors: Vec<String> = nodes.iter().map(&create_cursor).collect();

    // Window bounds before first/last are applied.
    let mut start = 0;
    let mut end = total_count;

    if let Some(after) = &args.after {
        let position = cursors
            .iter()
            .position(|c| c == after)
            .ok_or_else(|| CacheError::UserInput(format!("unknown 'after' cursor: {}", after)))?;
        start = position + 1;
    }

    if let Some(before) = &args.before {
        let position = cursors
            .iter()
            .position(|c| c == before)
            .ok_or_else(|| CacheError::UserInput(format!("unknown 'before' cursor: {}", before)))?;
        end = position.max(start);
    }

    // Forward slice, then backward slice, in that order.
    let mut first = args.first;
    if first.is_none() && args.last.is_none() && end - start > limit {
        first = Some(limit);
    }

    if let Some(first) = first {
        end = end.min(start + first);
    }
    if let Some(last) = args.last {
        start = start.max(end - last.min(end - start));
    }

    let has_next_page = end < total_count;
    let end_cursor = if end > start {
        Some(cursors[end - 1].clone())
    } else {
        None
    };

    let page: Vec<N> = nodes
        .into_iter()
        .skip(start)
        .take(end - start)
        .collect();

    Ok(Connection {
        nodes: page,
        total_count,
        has_next_page,
        end_cursor,
    })
}
