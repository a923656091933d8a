use vodio_api::ApiClient;

pub async fn run(client: &ApiClient, limit: u32, offset: u32) -> anyhow::Result<()> {
    let page = client.list_videos(limit, offset).await?;

    if page.items.is_empty() {
        println!("no videos (total {})", page.total);
        return Ok(());
    }

    for video in &page.items {
        println!(
            "{}  {:<10}  {}  {}",
            video.id,
            video.status,
            video.created_at.format("%Y-%m-%d %H:%M"),
            if video.title.is_empty() {
                "Untitled"
            } else {
                &video.title
            },
        );
    }
    println!(
        "showing {} of {} (offset {})",
        page.items.len(),
        page.total,
        page.offset
    );
    Ok(())
}

pub async fn show(client: &ApiClient, id: &str) -> anyhow::Result<()> {
    let video = client.get_video(id).await?;

    println!("id:          {}", video.id);
    println!(
        "title:       {}",
        if video.title.is_empty() {
            "Untitled"
        } else {
            &video.title
        }
    );
    if !video.description.is_empty() {
        println!("description: {}", video.description);
    }
    println!("status:      {}", video.status);
    if let Some(job_id) = &video.latest_job_id {
        println!("latest job:  {job_id}");
    }
    if let Some(thumbnail) = &video.thumbnail_url {
        println!("thumbnail:   {thumbnail}");
    }
    Ok(())
}
