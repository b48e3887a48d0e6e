use super::*;
use tao_watcher::harvest::CookieHarvester;
use tao_watcher::job_store::{ClaimLog, CsvJobStore, JobStore};
use tao_watcher::models::{JobState, STATE_COOKIE_OBTAINED, STATE_PROPS_CLAIMED};
use tao_watcher::scheduler::{RewardClaimer, CLAIM_SUCCESS};
use tao_watcher::JobRecord;

const ACTIVITY_URL: &str = "https://act.example.com/lottery";

fn reward_page() -> String {
    r#"<html><body>
         <div id="amsopenFrame_1700000000000"><div class="amsdialog_content">
           <div class="amsdialog_cmain">恭喜您获得限定道具</div>
           <div class="amsdialog_footer"><a class="amsdialog_btn amsdialog_bconfirm">确定</a></div>
         </div></div>
       </body></html>"#
        .to_string()
}

#[tokio::test]
async fn test_harvest_then_claim() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = get_test_config(dir.path());
    let records_dir = &config.directories.records_dir;

    let store = CsvJobStore::in_dir(records_dir);
    store.save(&[JobRecord::new(ACTIVITY_URL, "lottery.claim()")])?;

    let page = FakePage::new()
        .with_page(ACTIVITY_URL, &reward_page())
        .with_cookie("_ga", "GA1.2")
        .with_cookie("openid", "OPEN1")
        .with_cookie("access_token", "TOKEN1")
        .with_cookie("appid", "101");

    let harvester = CookieHarvester::new(config.harvest.clone(), Box::new(store.clone()));
    let report = harvester.harvest_next(&page).await?.expect("a pending job");
    assert_eq!(report.state1, STATE_COOKIE_OBTAINED);

    let jobs = store.load()?;
    assert_eq!(jobs[0].cookie, "openid=OPEN1; access_token=TOKEN1; appid=101");
    assert_eq!(jobs[0].state(), JobState::ReadyToClaim);

    let claim_log = ClaimLog::in_dir(records_dir);
    let claimer = RewardClaimer::new(
        config.claim.clone(),
        config.harvest.key_cookies.clone(),
        Box::new(store.clone()),
        claim_log.clone(),
    );
    let (row, job) = claimer.next_ready()?.expect("a ready job");
    claimer.prepare(&page, &job).await?;
    let attempt = claimer.claim_once(&page, row, &job).await?;

    assert!(attempt.success);
    assert_eq!(attempt.message, "网页消息：恭喜您获得限定道具");

    let scripts = page.scripts.lock().unwrap().clone();
    assert_eq!(
        scripts,
        vec![
            "document.cookie = 'openid=OPEN1; path=/'".to_string(),
            "document.cookie = 'access_token=TOKEN1; path=/'".to_string(),
            "document.cookie = 'appid=101; path=/'".to_string(),
            "lottery.claim()".to_string(),
        ]
    );
    // greeting dialog dismissed once, reward dialog once
    assert_eq!(page.clicks.lock().unwrap().len(), 2);

    let jobs = store.load()?;
    assert_eq!(jobs[0].state2, STATE_PROPS_CLAIMED);
    assert_eq!(jobs[0].state(), JobState::Claimed);

    let entries = claim_log.read_all()?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].state, CLAIM_SUCCESS);
    assert_eq!(entries[0].url, ACTIVITY_URL);
    Ok(())
}

#[tokio::test]
async fn test_record_file_is_created_on_first_use() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = get_test_config(dir.path());
    let store = CsvJobStore::in_dir(&config.directories.records_dir);

    store.ensure_exists()?;
    let header = std::fs::read_to_string(store.path())?;
    assert_eq!(header.trim(), "startTime,endTime,url,jsCode,state1,state2,state3,cookie");

    let harvester = CookieHarvester::new(config.harvest.clone(), Box::new(store));
    assert!(harvester.harvest_next(&FakePage::new()).await?.is_none());
    Ok(())
}
