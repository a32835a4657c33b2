mod people;

pub use people::{ids, name_groups, numbered, Person, PEOPLE_TABLE};

use keyset::{Page, PageRequest, PaginationConfig, PaginationError, PaginationResult, Row, SortInput, Value};

/// Pages over one seeded data set.
pub trait TestCaseRunner {
    fn paginate(
        &mut self,
        request: &PageRequest,
        config: &PaginationConfig,
    ) -> PaginationResult<Page<Row>>;

    /// Number of times the fetch function has been invoked so far.
    fn fetch_count(&self) -> usize;
}

pub trait TestSuiteRunner: Clone {
    type CaseRunner: TestCaseRunner;

    /// Seeds `people` into a fresh data set.
    fn create(&self, people: Vec<Person>) -> anyhow::Result<Self::CaseRunner>;
}

fn by_id() -> PaginationConfig {
    PaginationConfig::new().with_unique_column("id")
}

fn with_sorts(mut request: PageRequest, sorts: &[SortInput]) -> PageRequest {
    request.sorts = sorts.to_vec();
    request
}

const MAX_PAGES: usize = 100;

/// Collects every id by following `endCursor` forward.
pub fn walk_forward<C: TestCaseRunner>(
    runner: &mut C,
    size: i64,
    sorts: &[SortInput],
    config: &PaginationConfig,
) -> anyhow::Result<Vec<i64>> {
    let mut seen = Vec::new();
    let mut cursor = None;

    for _ in 0..MAX_PAGES {
        let request = with_sorts(PageRequest::first(size).after_opt(cursor), sorts);
        let page = runner.paginate(&request, config)?;
        assert!(page.len() as i64 <= size, "page exceeds requested size");
        seen.extend(ids(&page));

        if !page.page_info.has_next_page {
            return Ok(seen);
        }
        cursor = page.page_info.end_cursor;
    }

    anyhow::bail!("forward walk did not terminate after {MAX_PAGES} pages")
}

/// Collects every id by following `startCursor` backward from the end.
pub fn walk_backward<C: TestCaseRunner>(
    runner: &mut C,
    size: i64,
    sorts: &[SortInput],
    config: &PaginationConfig,
) -> anyhow::Result<Vec<i64>> {
    let mut pages = Vec::new();
    let mut cursor = None;

    for _ in 0..MAX_PAGES {
        let request = with_sorts(PageRequest::last(size).before_opt(cursor), sorts);
        let page = runner.paginate(&request, config)?;
        assert!(page.len() as i64 <= size, "page exceeds requested size");
        pages.push(ids(&page));

        if !page.page_info.has_previous_page {
            return Ok(pages.into_iter().rev().flatten().collect());
        }
        cursor = page.page_info.start_cursor;
    }

    anyhow::bail!("backward walk did not terminate after {MAX_PAGES} pages")
}

pub fn test_tie_break_by_unique_column<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    println!("  Testing tie-break by unique column...");

    let mut runner = r.create(name_groups())?;

    let page = runner.paginate(&PageRequest::first(3).sort_by(SortInput::asc("first_name")), &by_id())?;
    assert_eq!(ids(&page), vec![1, 2, 3]);

    let page = runner.paginate(&PageRequest::first(3).sort_by(SortInput::desc("first_name")), &by_id())?;
    assert_eq!(ids(&page), vec![5, 6, 3], "id tie-break stays ascending");

    let all = walk_forward(&mut runner, 2, &[SortInput::desc("first_name")], &by_id())?;
    assert_eq!(all, vec![5, 6, 3, 4, 1, 2]);

    Ok(())
}

pub fn test_three_column_tie_break<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    println!("  Testing three-column tie-break...");

    let mut runner = r.create(vec![
        Person::new(1, "Bea", "Ng"),
        Person::new(2, "Abe", "Zed"),
        Person::new(3, "Bea", "Ng"),
        Person::new(4, "Bea", "Ali"),
        Person::new(5, "Abe", "Zed"),
    ])?;

    let ascending_id = [
        SortInput::asc("first_name"),
        SortInput::desc("last_name"),
        SortInput::asc("id"),
    ];
    let page = runner.paginate(&with_sorts(PageRequest::first(5), &ascending_id), &by_id())?;
    assert_eq!(ids(&page), vec![2, 5, 1, 3, 4]);
    assert_eq!(walk_forward(&mut runner, 2, &ascending_id, &by_id())?, vec![2, 5, 1, 3, 4]);
    assert_eq!(walk_backward(&mut runner, 2, &ascending_id, &by_id())?, vec![2, 5, 1, 3, 4]);

    // Only exact ties swap when the final direction flips.
    let descending_id = [
        SortInput::asc("first_name"),
        SortInput::desc("last_name"),
        SortInput::desc("id"),
    ];
    let page = runner.paginate(&with_sorts(PageRequest::first(5), &descending_id), &by_id())?;
    assert_eq!(ids(&page), vec![5, 2, 3, 1, 4]);
    assert_eq!(walk_forward(&mut runner, 2, &descending_id, &by_id())?, vec![5, 2, 3, 1, 4]);

    Ok(())
}

pub fn test_page_info_flags<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    println!("  Testing page info flags...");

    let mut runner = r.create(numbered(10))?;
    let config = by_id();

    let page = runner.paginate(&PageRequest::first(3), &config)?;
    assert_eq!(ids(&page), vec![1, 2, 3]);
    assert!(!page.page_info.has_previous_page);
    assert!(page.page_info.has_next_page);

    let page = runner.paginate(&PageRequest::first(10), &config)?;
    assert_eq!(page.len(), 10);
    assert!(!page.page_info.has_previous_page);
    assert!(!page.page_info.has_next_page);

    let page = runner.paginate(&PageRequest::last(3), &config)?;
    assert_eq!(ids(&page), vec![8, 9, 10]);
    assert!(page.page_info.has_previous_page);
    assert!(!page.page_info.has_next_page);

    let second = runner
        .paginate(&PageRequest::first(2), &config)?
        .page_info
        .end_cursor
        .ok_or_else(|| anyhow::anyhow!("first page has no end cursor"))?;

    let page = runner.paginate(&PageRequest::first(3).after(second.clone()), &config)?;
    assert_eq!(ids(&page), vec![3, 4, 5]);
    assert!(page.page_info.has_previous_page);
    assert!(page.page_info.has_next_page);

    let page = runner.paginate(&PageRequest::first(7).after(second.clone()), &config)?;
    assert!(page.page_info.has_next_page, "eight records remain after the cursor");

    let page = runner.paginate(&PageRequest::first(8).after(second), &config)?;
    assert_eq!(ids(&page), (3..=10).collect::<Vec<_>>());
    assert!(page.page_info.has_previous_page);
    assert!(!page.page_info.has_next_page);

    assert_eq!(page.page_info.start_cursor.as_ref(), Some(&page.edges[0].cursor));
    assert_eq!(page.page_info.end_cursor.as_ref(), Some(&page.edges[7].cursor));

    Ok(())
}

pub fn test_walks_visit_every_record_once<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    println!("  Testing forward and backward walks...");

    let mut runner = r.create(numbered(10))?;
    let expected: Vec<i64> = (1..=10).collect();

    for size in [1, 3, 4, 10, 11] {
        assert_eq!(
            walk_forward(&mut runner, size, &[], &by_id())?,
            expected,
            "forward walk with page size {size}"
        );
        assert_eq!(
            walk_backward(&mut runner, size, &[], &by_id())?,
            expected,
            "backward walk with page size {size}"
        );
    }

    let descending: Vec<i64> = (1..=10).rev().collect();
    let sorts = [SortInput::desc("id")];
    assert_eq!(walk_forward(&mut runner, 3, &sorts, &by_id())?, descending);
    assert_eq!(walk_backward(&mut runner, 3, &sorts, &by_id())?, descending);

    Ok(())
}

pub fn test_boundary_symmetry<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    println!("  Testing boundary symmetry...");

    let mut runner = r.create(name_groups())?;
    let sorts = [SortInput::desc("first_name")];
    let config = by_id();

    let head = runner.paginate(&with_sorts(PageRequest::first(3), &sorts), &config)?;
    let after = head.page_info.end_cursor.clone().unwrap_or_default();
    let tail = runner.paginate(&with_sorts(PageRequest::first(3).after(after), &sorts), &config)?;

    let back_tail = runner.paginate(&with_sorts(PageRequest::last(3), &sorts), &config)?;
    let before = back_tail.page_info.start_cursor.clone().unwrap_or_default();
    let back_head = runner.paginate(&with_sorts(PageRequest::last(3).before(before), &sorts), &config)?;

    assert_eq!(ids(&head), vec![5, 6, 3]);
    assert_eq!(ids(&tail), vec![4, 1, 2]);
    assert_eq!(ids(&back_head), ids(&head));
    assert_eq!(ids(&back_tail), ids(&tail));

    assert_eq!(back_head.page_info, head.page_info);
    assert_eq!(back_tail.page_info, tail.page_info);

    Ok(())
}

pub fn test_null_coalescing<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    println!("  Testing null coalescing...");

    let sorts = [SortInput::asc("nickname")];
    let config = by_id().with_null_coalesce("nickname", "");

    let mut runner = r.create((1..=4).map(|id| Person::new(id, "Nil", "Null")).collect())?;
    assert_eq!(walk_forward(&mut runner, 2, &sorts, &config)?, vec![1, 2, 3, 4]);
    assert_eq!(walk_backward(&mut runner, 2, &sorts, &config)?, vec![1, 2, 3, 4]);

    let page = runner.paginate(&with_sorts(PageRequest::first(2), &sorts), &config)?;
    let after = page.page_info.end_cursor.unwrap_or_default();
    let page = runner.paginate(&with_sorts(PageRequest::first(2).after(after), &sorts), &config)?;
    assert_eq!(ids(&page), vec![3, 4]);
    assert!(!page.page_info.has_next_page);

    // Coalesced nulls sort with the substitute, ahead of real nicknames.
    let mut runner = r.create(vec![
        Person::new(1, "Zed", "A").with_nickname("zed"),
        Person::new(2, "Nil", "B"),
        Person::new(3, "Amy", "C").with_nickname("amy"),
        Person::new(4, "Nil", "D"),
        Person::new(5, "Bob", "E").with_nickname("bob"),
    ])?;
    assert_eq!(walk_forward(&mut runner, 2, &sorts, &config)?, vec![2, 4, 3, 5, 1]);
    assert_eq!(walk_backward(&mut runner, 2, &sorts, &config)?, vec![2, 4, 3, 5, 1]);

    let desc = [SortInput::desc("nickname")];
    assert_eq!(walk_forward(&mut runner, 2, &desc, &config)?, vec![1, 5, 3, 2, 4]);

    Ok(())
}

pub fn test_missing_coalesce_is_rejected<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    println!("  Testing nullable sort column without coalesce...");

    let sorts = [SortInput::asc("nickname")];
    let mut runner = r.create((1..=4).map(|id| Person::new(id, "Nil", "Null")).collect())?;

    let page = runner.paginate(&with_sorts(PageRequest::first(2), &sorts), &by_id())?;
    assert_eq!(ids(&page), vec![1, 2]);
    let after = page.page_info.end_cursor.unwrap_or_default();

    let fetches = runner.fetch_count();
    let result = runner.paginate(&with_sorts(PageRequest::first(2).after(after), &sorts), &by_id());
    match result {
        Err(PaginationError::UnsafeNullComparison { column }) => assert_eq!(column, "nickname"),
        other => anyhow::bail!("expected UnsafeNullComparison, got {other:?}"),
    }
    assert_eq!(runner.fetch_count(), fetches);

    // A NULL row past a non-null cursor must not be skipped silently.
    let desc = [SortInput::desc("nickname")];
    let mut runner = r.create(vec![
        Person::new(1, "Bo", "A").with_nickname("b"),
        Person::new(2, "Nil", "B"),
        Person::new(3, "Al", "C").with_nickname("a"),
    ])?;

    let page = runner.paginate(&with_sorts(PageRequest::first(1), &desc), &by_id())?;
    assert_eq!(ids(&page), vec![1]);
    let after = page.page_info.end_cursor.unwrap_or_default();

    match runner.paginate(&with_sorts(PageRequest::first(1).after(after), &desc), &by_id()) {
        Err(PaginationError::UnsafeNullComparison { column }) => assert_eq!(column, "nickname"),
        other => anyhow::bail!("expected UnsafeNullComparison after a non-null cursor, got {other:?}"),
    }

    Ok(())
}

pub fn test_rejected_combinations<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    println!("  Testing rejected argument combinations...");

    let mut runner = r.create(numbered(3))?;
    let cases = [
        (
            PageRequest {
                first: Some(3),
                last: Some(3),
                ..Default::default()
            },
            ("first", "last"),
        ),
        (PageRequest::default().before("x").after("y"), ("before", "after")),
        (PageRequest::first(3).before("x"), ("first", "before")),
        (PageRequest::last(3).after("y"), ("last", "after")),
    ];

    for (request, (a, b)) in cases {
        let err = match runner.paginate(&request, &by_id()) {
            Err(err) => err,
            Ok(_) => anyhow::bail!("{request:?} should be rejected"),
        };
        assert!(matches!(err, PaginationError::ConflictingPageArguments { .. }));
        let message = err.to_string();
        assert!(message.contains(a) && message.contains(b), "{message}");
    }

    for request in [PageRequest::first(0), PageRequest::last(-2)] {
        let err = runner.paginate(&request, &by_id()).err();
        assert!(matches!(err, Some(PaginationError::InvalidLimit { .. })));
    }

    let err = runner.paginate(&PageRequest::default(), &by_id()).err();
    assert!(matches!(err, Some(PaginationError::MissingPageDirection)));

    let err = runner.paginate(&PageRequest::first(1), &PaginationConfig::new()).err();
    assert!(matches!(err, Some(PaginationError::MissingSortSpecification)));

    assert_eq!(runner.fetch_count(), 0, "rejected requests must not fetch");

    Ok(())
}

pub fn test_invalid_cursors<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    println!("  Testing invalid cursors...");

    let mut runner = r.create(name_groups())?;

    let minted = runner
        .paginate(&PageRequest::first(2), &by_id())?
        .page_info
        .end_cursor
        .unwrap_or_default();
    let fetches = runner.fetch_count();

    let foreign = PageRequest::first(2)
        .after(minted.clone())
        .sort_by(SortInput::asc("first_name"));
    let tampered = {
        let mut bytes = minted.into_bytes();
        let last = bytes.len() - 1;
        bytes[last] = if bytes[last] == b'A' { b'B' } else { b'A' };
        String::from_utf8(bytes)?
    };

    for request in [
        foreign,
        PageRequest::first(2).after("x"),
        PageRequest::last(2).before("%%%"),
        PageRequest::first(2).after(tampered),
    ] {
        let err = runner.paginate(&request, &by_id()).err();
        assert!(
            matches!(err, Some(PaginationError::InvalidCursor { .. })),
            "{request:?} gave {err:?}"
        );
    }
    assert_eq!(runner.fetch_count(), fetches);

    Ok(())
}

pub fn test_temporal_sort<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    println!("  Testing temporal sort keys...");

    let people = numbered(9);
    let mut expected = people.clone();
    expected.sort_by(|a, b| b.born.cmp(&a.born).then(a.id.cmp(&b.id)));
    let expected: Vec<i64> = expected.iter().map(|p| p.id).collect();

    let mut runner = r.create(people)?;
    let sorts = [SortInput::desc("born")];

    assert_eq!(walk_forward(&mut runner, 2, &sorts, &by_id())?, expected);
    assert_eq!(walk_backward(&mut runner, 4, &sorts, &by_id())?, expected);

    let page = runner.paginate(&with_sorts(PageRequest::first(1), &sorts), &by_id())?;
    assert!(matches!(
        page.nodes().next().and_then(|row| row.get("born")),
        Some(Value::Date(_))
    ));

    Ok(())
}

pub fn test_float_sort<R: TestSuiteRunner>(r: &R) -> anyhow::Result<()> {
    println!("  Testing float sort keys...");

    // Values whose shortest decimal form needs exact parsing to come back unchanged.
    let scores = [
        5.2578981863911145e-55,
        1.0715660391465826e-75,
        5.2578981863911145e-55,
        -1.81996730402717e-179,
        -1.603964615428183e143,
        1.0715660391465826e-75,
    ];
    let people = (1..)
        .zip(scores)
        .map(|(id, score)| Person::new(id, "Flo", "Tan").with_score(score))
        .collect();
    let mut runner = r.create(people)?;

    let ascending = [SortInput::asc("score")];
    for size in [1, 2] {
        assert_eq!(walk_forward(&mut runner, size, &ascending, &by_id())?, vec![5, 4, 2, 6, 1, 3]);
        assert_eq!(walk_backward(&mut runner, size, &ascending, &by_id())?, vec![5, 4, 2, 6, 1, 3]);
    }

    let descending = [SortInput::desc("score")];
    assert_eq!(walk_forward(&mut runner, 1, &descending, &by_id())?, vec![1, 3, 2, 6, 4, 5]);

    Ok(())
}

pub fn run_all_tests<R: TestSuiteRunner + Clone>(runner: R) -> anyhow::Result<()> {
    println!("Running all test cases...");

    test_tie_break_by_unique_column(&runner)?;
    test_three_column_tie_break(&runner)?;
    test_page_info_flags(&runner)?;
    test_walks_visit_every_record_once(&runner)?;
    test_boundary_symmetry(&runner)?;
    test_null_coalescing(&runner)?;
    test_missing_coalesce_is_rejected(&runner)?;
    test_rejected_combinations(&runner)?;
    test_invalid_cursors(&runner)?;
    test_temporal_sort(&runner)?;
    test_float_sort(&runner)?;

    println!("All tests passed!");
    Ok(())
}
