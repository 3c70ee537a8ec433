use super::*;

#[test]
fn test_default_request() {
    let request = PageRequest::default();
    assert_eq!(request.page_number(), 1);
    assert_eq!(request.limit(), 20);
    assert_eq!(request.offset(), 0);
}

#[test]
fn test_offset_for_later_pages() {
    assert_eq!(PageRequest::new(3, 25).offset(), 50);
    assert_eq!(
        PageRequest::new(u32::MAX, MAX_PER_PAGE).offset(),
        u64::from(u32::MAX - 1) * u64::from(MAX_PER_PAGE)
    );
}

#[test]
fn test_page_zero_reads_as_first_page() {
    let request = PageRequest::new(0, 10);
    assert_eq!(request.page_number(), 1);
    assert_eq!(request.offset(), 0);
}

#[test]
fn test_page_size_is_clamped() {
    assert_eq!(PageRequest::new(1, 0).limit(), 1);
    assert_eq!(PageRequest::new(1, 10_000).limit(), u64::from(MAX_PER_PAGE));
}

#[test]
fn test_response_meta() {
    let response = PageResponse::new(vec!["a", "b"], &PageRequest::new(1, 2), 5);
    assert_eq!(response.data, vec!["a", "b"]);
    assert_eq!(response.meta.total_pages, 3);
    assert!(response.meta.has_more);

    let last: PageResponse<&str> = PageResponse::new(vec!["e"], &PageRequest::new(3, 2), 5);
    assert!(!last.meta.has_more);
}

#[test]
fn test_empty_history_has_one_page() {
    let response: PageResponse<u8> = PageResponse::new(vec![], &PageRequest::default(), 0);
    assert_eq!(response.meta.total_pages, 1);
    assert!(!response.meta.has_more);
}

#[test]
fn test_deserialize_fills_defaults() {
    let request: PageRequest = serde_json::from_str(r#"{"page": 4}"#).unwrap();
    assert_eq!(request, PageRequest::new(4, 20));
}
